use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{LedgerStatus, TransactionStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid loan terms: {message}")]
    InvalidTerms {
        message: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("loan is closed: current status is {status:?}")]
    LoanClosed {
        status: LedgerStatus,
    },

    #[error("prepayment not allowed: {reason}")]
    PrepaymentNotAllowed {
        reason: String,
    },

    #[error("amount out of range: {amount}, allowed {min:?}..{max:?}")]
    AmountOutOfRange {
        amount: Money,
        min: Option<Money>,
        max: Option<Money>,
    },

    #[error("amount {provided} does not cover foreclosure payoff {required}")]
    InsufficientPayoff {
        required: Money,
        provided: Money,
    },

    #[error("version conflict: expected {expected}, actual {actual}")]
    ConcurrencyConflict {
        expected: u64,
        actual: u64,
    },

    #[error("transaction not cleared: status is {status:?}")]
    TransactionNotCleared {
        status: TransactionStatus,
    },

    #[error("transaction not found: {idempotency_key}")]
    TransactionNotFound {
        idempotency_key: String,
    },

    #[error("transaction already reversed: {idempotency_key}")]
    AlreadyReversed {
        idempotency_key: String,
    },

    #[error("installment not found: sequence {sequence}")]
    InstallmentNotFound {
        sequence: u32,
    },

    #[error("installment {sequence} is terminal and cannot be modified")]
    InstallmentTerminal {
        sequence: u32,
    },

    #[error("restructure must take effect on or after the first open installment, got {sequence}")]
    InvalidRestructurePoint {
        sequence: u32,
    },

    #[error("invalid effective date {date}: {message}")]
    InvalidEffectiveDate {
        date: NaiveDate,
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
