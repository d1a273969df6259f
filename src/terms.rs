use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};

/// immutable loan terms, snapshotted at disbursement
///
/// restructuring never edits a snapshot; it records a new one alongside the
/// old in the restructure history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub disbursement_date: NaiveDate,
    pub first_due_date: NaiveDate,
}

impl LoanTerms {
    pub fn new(
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        disbursement_date: NaiveDate,
        first_due_date: NaiveDate,
    ) -> Result<Self> {
        let terms = Self {
            principal,
            annual_rate,
            tenure_months,
            disbursement_date,
            first_due_date,
        };
        terms.validate()?;
        Ok(terms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(LedgerError::InvalidTerms {
                message: format!("principal must be positive, got {}", self.principal),
            });
        }
        if self.annual_rate.is_negative() {
            return Err(LedgerError::InvalidTerms {
                message: format!("rate must not be negative, got {}", self.annual_rate),
            });
        }
        if self.tenure_months < 1 {
            return Err(LedgerError::InvalidTerms {
                message: "tenure must be at least one month".to_string(),
            });
        }
        if self.first_due_date < self.disbursement_date {
            return Err(LedgerError::InvalidTerms {
                message: "first due date precedes disbursement".to_string(),
            });
        }
        Ok(())
    }

    /// monthly reducing-balance rate
    pub fn monthly_rate(&self) -> Rate {
        self.annual_rate.monthly_rate()
    }
}
