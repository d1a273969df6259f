use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::schedule::{AmortizationGenerator, ScheduledInstallment};
use crate::terms::LoanTerms;

/// approved restructure command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureRequest {
    pub new_annual_rate: Rate,
    /// tenure of the regenerated tail, in months
    pub new_tenure_months: u32,
    /// first installment replaced by the new schedule
    pub effective_from_sequence: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// append-only record of one restructuring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureEvent {
    pub previous_terms: LoanTerms,
    pub new_terms: LoanTerms,
    pub effective_from_sequence: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// outcome of a restructure applied to a schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RestructureOutcome {
    pub record: RestructureEvent,
    pub cancelled_sequences: Vec<u32>,
    /// balance amortized by the new tail: unpaid principal of the cancelled
    /// installments plus their capitalized unpaid interest and penalties
    pub restructured_balance: Money,
}

/// regenerates the remaining schedule under new terms, preserving history
pub struct RestructureHandler;

impl RestructureHandler {
    pub fn apply(
        request: &RestructureRequest,
        current_terms: &LoanTerms,
        installments: &mut Vec<ScheduledInstallment>,
    ) -> Result<RestructureOutcome> {
        if request.new_tenure_months < 1 {
            return Err(LedgerError::InvalidTerms {
                message: "restructure tenure must be at least one month".to_string(),
            });
        }
        if request.new_annual_rate.is_negative() {
            return Err(LedgerError::InvalidTerms {
                message: format!("rate must not be negative, got {}", request.new_annual_rate),
            });
        }

        // the tail being replaced: every live installment at or after the
        // effective point
        let tail: Vec<usize> = installments
            .iter()
            .enumerate()
            .filter(|(_, inst)| {
                !inst.status.is_terminal() && inst.sequence >= request.effective_from_sequence
            })
            .map(|(idx, _)| idx)
            .collect();
        if tail.is_empty() {
            return Err(LedgerError::InvalidRestructurePoint {
                sequence: request.effective_from_sequence,
            });
        }

        // arrears on the cancelled tail are capitalized into the new balance;
        // no due component is dropped
        let restructured_balance: Money = tail
            .iter()
            .map(|&idx| installments[idx].total_outstanding())
            .sum();
        if !restructured_balance.is_positive() {
            return Err(LedgerError::InvalidRestructurePoint {
                sequence: request.effective_from_sequence,
            });
        }

        let first_due = installments[tail[0]].due_date;
        // replacement rows continue numbering after every existing row, so
        // sequence numbers stay unique across cancelled history
        let start_sequence = installments
            .iter()
            .map(|inst| inst.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        let effective_date = request.timestamp.date_naive();

        let new_terms = LoanTerms {
            principal: restructured_balance,
            annual_rate: request.new_annual_rate,
            tenure_months: request.new_tenure_months,
            disbursement_date: effective_date,
            first_due_date: first_due.max(effective_date),
        };

        let replacement = AmortizationGenerator::generate_from_balance(
            new_terms.principal,
            new_terms.annual_rate,
            new_terms.tenure_months,
            new_terms.first_due_date,
            start_sequence,
        )?;

        let mut cancelled_sequences = Vec::with_capacity(tail.len());
        for idx in tail {
            installments[idx].cancel();
            cancelled_sequences.push(installments[idx].sequence);
        }
        installments.extend(replacement);

        Ok(RestructureOutcome {
            record: RestructureEvent {
                previous_terms: current_terms.clone(),
                new_terms,
                effective_from_sequence: request.effective_from_sequence,
                reason: request.reason.clone(),
                timestamp: request.timestamp,
            },
            cancelled_sequences,
            restructured_balance,
        })
    }
}
