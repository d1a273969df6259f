use chrono::NaiveDate;

use crate::config::{PenaltyConfig, PenaltyFeeType};
use crate::decimal::Money;
use crate::schedule::ScheduledInstallment;

/// engine for one-shot late fees on overdue installments
pub struct PenaltyEngine {
    pub config: PenaltyConfig,
}

/// outcome of a penalty evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenaltyAssessment {
    pub amount: Money,
    pub overdue_base: Money,
    pub grace_applied: bool,
}

impl PenaltyEngine {
    pub fn new(config: PenaltyConfig) -> Self {
        Self { config }
    }

    /// decide whether a late fee is due without mutating the installment
    ///
    /// a fee is due once per installment: after the grace period elapses,
    /// while dues remain unpaid, and only if no fee has been applied before.
    pub fn assess(&self, installment: &ScheduledInstallment, as_of: NaiveDate) -> PenaltyAssessment {
        let overdue_base = installment.emi_unpaid_portion();

        if as_of <= installment.grace_end(self.config.grace_period_days) {
            return PenaltyAssessment {
                amount: Money::ZERO,
                overdue_base,
                grace_applied: true,
            };
        }

        if installment.penalty_applied
            || installment.status.is_terminal()
            || overdue_base.is_zero()
        {
            return PenaltyAssessment {
                amount: Money::ZERO,
                overdue_base,
                grace_applied: false,
            };
        }

        let amount = match self.config.fee {
            PenaltyFeeType::FixedAmount(fee) => fee,
            PenaltyFeeType::PercentageOfOverdueAmount(rate) => overdue_base.at_rate(rate),
        };

        PenaltyAssessment {
            amount,
            overdue_base,
            grace_applied: false,
        }
    }

    /// apply the late fee to the installment, returns the accrued delta
    ///
    /// idempotent: the `penalty_applied` flag is set permanently on first
    /// application, so repeated invocations (a recurring scheduler, a retried
    /// command) are no-ops.
    pub fn apply(&self, installment: &mut ScheduledInstallment, as_of: NaiveDate) -> Option<Money> {
        let assessment = self.assess(installment, as_of);
        if assessment.amount.is_zero() {
            return None;
        }

        installment.penalty_due += assessment.amount;
        installment.penalty_applied = true;
        Some(assessment.amount)
    }
}
