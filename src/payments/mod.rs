pub mod allocator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{PaymentAllocation, PaymentMethod, TransactionId, TransactionStatus};

pub use allocator::{AllocationOutcome, PaymentAllocator};

/// incoming payment command from a gateway or manual admin entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCommand {
    /// caller-supplied key deduplicating at-least-once delivery
    pub idempotency_key: String,
    pub amount: Money,
    pub received_at: DateTime<Utc>,
    pub method: PaymentMethod,
    /// clearance status reported by the payment channel
    pub status: TransactionStatus,
}

/// per-installment slice of one transaction's allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLeg {
    pub sequence: u32,
    pub to_penalty: Money,
    pub to_interest: Money,
    pub to_principal: Money,
}

impl AllocationLeg {
    pub fn total(&self) -> Money {
        self.to_penalty + self.to_interest + self.to_principal
    }
}

/// a recorded payment transaction
///
/// immutable once cleared and allocated; a reversal records a compensating
/// transaction instead of editing this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub idempotency_key: String,
    pub amount: Money,
    pub received_at: DateTime<Utc>,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub allocation: PaymentAllocation,
    pub legs: Vec<AllocationLeg>,
    /// set on compensating transactions, pointing at the reversed original
    pub reversal_of: Option<TransactionId>,
}

impl PaymentTransaction {
    pub fn from_command(command: &PaymentCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            idempotency_key: command.idempotency_key.clone(),
            amount: command.amount,
            received_at: command.received_at,
            method: command.method.clone(),
            status: command.status,
            allocation: PaymentAllocation::default(),
            legs: Vec::new(),
            reversal_of: None,
        }
    }

    /// compensating entry that undoes this transaction's allocation
    pub fn compensating(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            idempotency_key: format!("{}:reversal", self.idempotency_key),
            amount: self.amount,
            received_at: timestamp,
            method: self.method.clone(),
            status: TransactionStatus::Cleared,
            allocation: self.allocation,
            legs: self.legs.clone(),
            reversal_of: Some(self.id),
        }
    }
}
