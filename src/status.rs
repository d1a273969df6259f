use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::schedule::ScheduledInstallment;
use crate::types::{AgingBucket, InstallmentStatus, LedgerStatus};

/// derived aggregate fields, recomputed after every mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedState {
    pub outstanding_principal: Money,
    pub next_due_sequence: Option<u32>,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
    pub overdue_principal: Money,
    pub overdue_interest: Money,
    pub overdue_penalty: Money,
    pub days_past_due: u32,
    pub aging_bucket: AgingBucket,
    pub consecutive_missed: u32,
    pub status: LedgerStatus,
}

impl DerivedState {
    pub fn overdue_total(&self) -> Money {
        self.overdue_principal + self.overdue_interest + self.overdue_penalty
    }
}

/// a recompute pass over the schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputeOutcome {
    pub derived: DerivedState,
    /// installments that moved into Overdue during this pass
    pub newly_overdue: Vec<(u32, NaiveDate, Money)>,
}

/// derives installment and ledger status after any mutation
pub struct StatusRecalculator {
    grace_period_days: u32,
    default_dpd_threshold: u32,
}

impl StatusRecalculator {
    pub fn new(grace_period_days: u32, default_dpd_threshold: u32) -> Self {
        Self {
            grace_period_days,
            default_dpd_threshold,
        }
    }

    /// re-derive every live installment status and all aggregate fields
    ///
    /// `baseline` is the status the ledger reverts to when nothing is due
    /// and unpaid: Active normally, Restructured after a restructure. Closed
    /// statuses are terminal and pass through untouched.
    pub fn recompute(
        &self,
        installments: &mut [ScheduledInstallment],
        as_of: NaiveDate,
        baseline: LedgerStatus,
    ) -> RecomputeOutcome {
        let mut newly_overdue = Vec::new();

        for inst in installments.iter_mut() {
            let derived = inst.derived_status(as_of, self.grace_period_days);
            if derived != inst.status {
                if derived == InstallmentStatus::Overdue {
                    newly_overdue.push((inst.sequence, inst.due_date, inst.total_outstanding()));
                }
                inst.status = derived;
            }
        }

        let derived = self.derive_aggregates(installments, as_of, baseline);

        RecomputeOutcome {
            derived,
            newly_overdue,
        }
    }

    fn derive_aggregates(
        &self,
        installments: &[ScheduledInstallment],
        as_of: NaiveDate,
        baseline: LedgerStatus,
    ) -> DerivedState {
        let outstanding_principal: Money = installments
            .iter()
            .filter(|inst| inst.status != InstallmentStatus::Cancelled)
            .map(|inst| inst.principal_outstanding())
            .sum();

        let next_due = installments
            .iter()
            .filter(|inst| inst.status.is_payable() && !inst.total_outstanding().is_zero())
            .min_by_key(|inst| inst.sequence);

        // delinquent rows: unpaid past due date plus grace
        let mut overdue_principal = Money::ZERO;
        let mut overdue_interest = Money::ZERO;
        let mut overdue_penalty = Money::ZERO;
        let mut oldest_delinquent_due: Option<NaiveDate> = None;
        for inst in installments {
            let delinquent = matches!(
                inst.status,
                InstallmentStatus::Overdue | InstallmentStatus::PartiallyPaid
            ) && as_of > inst.grace_end(self.grace_period_days);
            if !delinquent {
                continue;
            }
            overdue_principal += inst.principal_outstanding();
            overdue_interest += inst.interest_outstanding();
            overdue_penalty += inst.penalty_outstanding();
            oldest_delinquent_due = Some(match oldest_delinquent_due {
                Some(existing) => existing.min(inst.due_date),
                None => inst.due_date,
            });
        }

        let days_past_due = oldest_delinquent_due
            .map(|due| (as_of - due).num_days().max(0) as u32)
            .unwrap_or(0);

        let consecutive_missed = installments
            .iter()
            .rev()
            .filter(|inst| {
                inst.status != InstallmentStatus::Cancelled && inst.due_date <= as_of
            })
            .take_while(|inst| inst.status == InstallmentStatus::Overdue)
            .count() as u32;

        let all_settled = installments
            .iter()
            .filter(|inst| inst.status != InstallmentStatus::Cancelled)
            .all(|inst| inst.status.is_terminal());

        let in_grace = installments.iter().any(|inst| {
            !inst.status.is_terminal()
                && !inst.total_outstanding().is_zero()
                && as_of > inst.due_date
                && as_of <= inst.grace_end(self.grace_period_days)
        });

        let status = if baseline.is_closed() {
            baseline
        } else if outstanding_principal.is_zero() && all_settled {
            LedgerStatus::FullyRepaid
        } else if days_past_due > self.default_dpd_threshold {
            LedgerStatus::Defaulted
        } else if days_past_due > 0 {
            LedgerStatus::ActiveOverdue
        } else if in_grace {
            LedgerStatus::ActiveGrace
        } else {
            baseline
        };

        DerivedState {
            outstanding_principal,
            next_due_sequence: next_due.map(|inst| inst.sequence),
            next_due_date: next_due.map(|inst| inst.due_date),
            next_due_amount: next_due.map(|inst| inst.total_outstanding()),
            overdue_principal,
            overdue_interest,
            overdue_penalty,
            days_past_due,
            aging_bucket: AgingBucket::from_dpd(days_past_due),
            consecutive_missed,
            status,
        }
    }
}
