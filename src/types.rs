use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;

/// unique identifier for a loan ledger
pub type LoanId = Uuid;

/// unique identifier for a payment transaction
pub type TransactionId = Uuid;

/// per-installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    /// not yet due, nothing received
    Pending,
    /// some component received, not fully covered
    PartiallyPaid,
    /// fully covered on or within grace of the due date
    Paid,
    /// fully covered after grace elapsed
    PaidLate,
    /// past due date plus grace with dues outstanding
    Overdue,
    /// remaining dues forgiven
    Waived,
    /// removed from the live schedule by restructure or foreclosure
    Cancelled,
}

impl InstallmentStatus {
    /// terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallmentStatus::Paid
                | InstallmentStatus::PaidLate
                | InstallmentStatus::Waived
                | InstallmentStatus::Cancelled
        )
    }

    /// statuses eligible for payment allocation
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            InstallmentStatus::Pending
                | InstallmentStatus::PartiallyPaid
                | InstallmentStatus::Overdue
        )
    }
}

/// overall ledger status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    /// performing, nothing due-and-unpaid
    Active,
    /// an unpaid due date has passed but grace has not elapsed
    ActiveGrace,
    /// grace elapsed with dues unpaid
    ActiveOverdue,
    /// days past due exceeded the configured threshold
    Defaulted,
    /// remaining schedule replaced under new terms
    Restructured,
    /// every installment terminal and principal fully recovered
    FullyRepaid,
    /// closed early by full payoff
    Foreclosed,
    /// written off as a loss
    WrittenOff,
}

impl LedgerStatus {
    /// closed ledgers accept no further money movement
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            LedgerStatus::FullyRepaid | LedgerStatus::Foreclosed | LedgerStatus::WrittenOff
        )
    }
}

/// declared payment method on an incoming transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    BankTransfer,
    Upi,
    Card,
    Cash,
    Cheque,
    Other(String),
}

/// payment transaction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Cleared,
    Failed,
    Bounced,
    Reversed,
}

/// how the remaining schedule is rebuilt after a part-prepayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalculationStrategy {
    /// keep the remaining tenure, shrink the EMI
    ReduceEmi,
    /// keep the EMI, shrink the remaining tenure
    ReduceTenure,
}

/// realized split of one payment across due components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaymentAllocation {
    pub to_penalty: Money,
    pub to_interest: Money,
    pub to_principal: Money,
    pub unallocated: Money,
}

impl PaymentAllocation {
    pub fn total_applied(&self) -> Money {
        self.to_penalty + self.to_interest + self.to_principal
    }

    /// conservation check: applied plus unallocated equals the received amount
    pub fn conserves(&self, received: Money) -> bool {
        self.total_applied() + self.unallocated == received
    }
}

/// delinquency aging bucket derived from days past due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgingBucket {
    Current,
    Dpd1To30,
    Dpd31To60,
    Dpd61To90,
    Dpd90Plus,
}

impl AgingBucket {
    pub fn from_dpd(dpd: u32) -> Self {
        match dpd {
            0 => AgingBucket::Current,
            1..=30 => AgingBucket::Dpd1To30,
            31..=60 => AgingBucket::Dpd31To60,
            61..=90 => AgingBucket::Dpd61To90,
            _ => AgingBucket::Dpd90Plus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(InstallmentStatus::Paid.is_terminal());
        assert!(InstallmentStatus::Cancelled.is_terminal());
        assert!(!InstallmentStatus::Overdue.is_terminal());
        assert!(InstallmentStatus::Overdue.is_payable());
        assert!(!InstallmentStatus::Waived.is_payable());
    }

    #[test]
    fn test_closed_ledger_statuses() {
        assert!(LedgerStatus::Foreclosed.is_closed());
        assert!(LedgerStatus::WrittenOff.is_closed());
        assert!(!LedgerStatus::Restructured.is_closed());
        assert!(!LedgerStatus::ActiveOverdue.is_closed());
    }

    #[test]
    fn test_allocation_conservation() {
        let alloc = PaymentAllocation {
            to_penalty: Money::from_str_exact("25.00").unwrap(),
            to_interest: Money::from_str_exact("100.00").unwrap(),
            to_principal: Money::from_str_exact("800.00").unwrap(),
            unallocated: Money::from_str_exact("75.00").unwrap(),
        };
        assert!(alloc.conserves(Money::from_major(1000)));
        assert!(!alloc.conserves(Money::from_major(999)));
    }

    #[test]
    fn test_aging_buckets() {
        assert_eq!(AgingBucket::from_dpd(0), AgingBucket::Current);
        assert_eq!(AgingBucket::from_dpd(30), AgingBucket::Dpd1To30);
        assert_eq!(AgingBucket::from_dpd(31), AgingBucket::Dpd31To60);
        assert_eq!(AgingBucket::from_dpd(91), AgingBucket::Dpd90Plus);
    }
}
