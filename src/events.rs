use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{LoanId, LedgerStatus, PaymentAllocation, RecalculationStrategy, TransactionId};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LedgerOpened {
        loan_id: LoanId,
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        first_due_date: NaiveDate,
    },
    LoanFullyRepaid {
        loan_id: LoanId,
        closure_date: NaiveDate,
    },
    LoanForeclosed {
        loan_id: LoanId,
        payoff_amount: Money,
        actual_closure_date: NaiveDate,
    },
    LoanRestructured {
        loan_id: LoanId,
        effective_from_sequence: u32,
        new_annual_rate: Rate,
        new_tenure_months: u32,
        reason: String,
    },
    LoanWrittenOff {
        loan_id: LoanId,
        written_off_principal: Money,
        date: NaiveDate,
        reason: String,
    },
    LoanDefaulted {
        loan_id: LoanId,
        days_past_due: u32,
        overdue_total: Money,
    },

    // payment events
    PaymentReceived {
        loan_id: LoanId,
        transaction_id: TransactionId,
        idempotency_key: String,
        amount: Money,
        allocation: PaymentAllocation,
        timestamp: DateTime<Utc>,
    },
    PaymentReversed {
        loan_id: LoanId,
        original_transaction_id: TransactionId,
        compensating_transaction_id: TransactionId,
        amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    PrepaymentApplied {
        loan_id: LoanId,
        gross_amount: Money,
        fee: Money,
        new_outstanding_principal: Money,
        strategy: RecalculationStrategy,
        date: NaiveDate,
    },

    // installment events
    InstallmentPaid {
        loan_id: LoanId,
        sequence: u32,
        paid_late: bool,
        payment_date: NaiveDate,
    },
    InstallmentOverdue {
        loan_id: LoanId,
        sequence: u32,
        due_date: NaiveDate,
        unpaid_amount: Money,
    },
    InstallmentWaived {
        loan_id: LoanId,
        sequence: u32,
        waived_amount: Money,
    },
    PenaltyApplied {
        loan_id: LoanId,
        sequence: u32,
        amount: Money,
        as_of: NaiveDate,
    },

    // status events
    StatusChanged {
        loan_id: LoanId,
        old_status: LedgerStatus,
        new_status: LedgerStatus,
    },
}

/// event store for collecting events during commands
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
