pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod payments;
pub mod penalty;
pub mod prepayment;
pub mod restructure;
pub mod schedule;
pub mod statement;
pub mod status;
pub mod terms;
pub mod types;

// re-export key types
pub use config::{LedgerConfig, PenaltyConfig, PenaltyFeeType, PrepaymentConfig, PrepaymentFeeType};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use ledger::{LedgerAggregate, PaymentReceipt, WriteOffRecord};
pub use payments::{
    AllocationLeg, AllocationOutcome, PaymentAllocator, PaymentCommand, PaymentTransaction,
};
pub use penalty::{PenaltyAssessment, PenaltyEngine};
pub use prepayment::{ForeclosureOutcome, PrepaymentHandler, PrepaymentOutcome, PrepaymentRequest};
pub use restructure::{RestructureEvent, RestructureHandler, RestructureRequest};
pub use schedule::{calculate_emi, AmortizationGenerator, ScheduledInstallment};
pub use statement::StatementView;
pub use status::{DerivedState, StatusRecalculator};
pub use terms::LoanTerms;
pub use types::{
    AgingBucket, InstallmentStatus, LedgerStatus, LoanId, PaymentAllocation, PaymentMethod,
    RecalculationStrategy, TransactionId, TransactionStatus,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
