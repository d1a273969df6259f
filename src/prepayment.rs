use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PrepaymentConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::schedule::{AmortizationGenerator, ScheduledInstallment};
use crate::types::RecalculationStrategy;

/// lump-sum principal reduction or full early closure request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepaymentRequest {
    pub amount: Money,
    pub date: NaiveDate,
    pub strategy: RecalculationStrategy,
}

/// result of a part-prepayment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepaymentOutcome {
    pub gross_amount: Money,
    pub fee: Money,
    pub net_amount: Money,
    pub new_outstanding_principal: Money,
    pub strategy: RecalculationStrategy,
    pub cancelled_sequences: Vec<u32>,
    pub new_emi: Money,
    pub new_tenure_months: u32,
}

/// result of a foreclosure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeclosureOutcome {
    pub payoff: Money,
    pub fee: Money,
    pub excess: Money,
    /// interest collected off matured installments as part of the payoff
    pub matured_interest: Money,
    /// penalties collected off matured installments as part of the payoff
    pub matured_penalty: Money,
    pub cancelled_sequences: Vec<u32>,
    pub settled_sequences: Vec<u32>,
}

/// applies prepayment and foreclosure against a schedule
pub struct PrepaymentHandler {
    pub config: PrepaymentConfig,
}

impl PrepaymentHandler {
    pub fn new(config: PrepaymentConfig) -> Self {
        Self { config }
    }

    fn check_policy(&self, date: NaiveDate, disbursement_date: NaiveDate) -> Result<()> {
        if !self.config.allow_prepayment {
            return Err(LedgerError::PrepaymentNotAllowed {
                reason: "prepayment is disabled for this product".to_string(),
            });
        }
        let lock_in_end = disbursement_date
            .checked_add_months(Months::new(self.config.lock_in_months))
            .ok_or_else(|| LedgerError::InvalidDate {
                message: format!("lock-in overflow from {}", disbursement_date),
            })?;
        if date < lock_in_end {
            return Err(LedgerError::PrepaymentNotAllowed {
                reason: format!("inside lock-in period until {}", lock_in_end),
            });
        }
        Ok(())
    }

    fn check_amount_bounds(&self, amount: Money) -> Result<()> {
        let below = self.config.min_amount.map(|min| amount < min).unwrap_or(false);
        let above = self.config.max_amount.map(|max| amount > max).unwrap_or(false);
        if below || above {
            return Err(LedgerError::AmountOutOfRange {
                amount,
                min: self.config.min_amount,
                max: self.config.max_amount,
            });
        }
        Ok(())
    }

    /// apply a part-prepayment: cancel the open future tail and regenerate it
    /// from the reduced balance
    ///
    /// dues on already-matured installments must be cleared first; the lump
    /// sum reduces principal only and never substitutes for an EMI.
    pub fn part_prepay(
        &self,
        request: PrepaymentRequest,
        annual_rate: Rate,
        disbursement_date: NaiveDate,
        outstanding_principal: Money,
        installments: &mut Vec<ScheduledInstallment>,
    ) -> Result<PrepaymentOutcome> {
        if !request.amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: request.amount,
            });
        }
        self.check_policy(request.date, disbursement_date)?;
        self.check_amount_bounds(request.amount)?;

        if has_matured_dues(installments, request.date) {
            return Err(LedgerError::PrepaymentNotAllowed {
                reason: "overdue dues must be cleared before prepayment".to_string(),
            });
        }

        let fee = self.config.fee.fee_on(request.amount);
        let net = request.amount - fee;
        if !net.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount { amount: net });
        }
        if net >= outstanding_principal {
            return Err(LedgerError::PrepaymentNotAllowed {
                reason: "net amount covers the full balance; foreclose instead".to_string(),
            });
        }

        // the open tail: untouched installments falling due after the
        // prepayment date
        let tail: Vec<usize> = installments
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.status.is_payable() && inst.due_date > request.date)
            .map(|(idx, _)| idx)
            .collect();
        if tail.is_empty() {
            return Err(LedgerError::PrepaymentNotAllowed {
                reason: "no open installments remain to recompute".to_string(),
            });
        }

        let current_emi = installments[tail[0]].emi_amount();
        let first_due = installments[tail[0]].due_date;
        let remaining_months = tail.len() as u32;
        // replacement rows continue numbering after every existing row, so
        // sequence numbers stay unique across cancelled history
        let start_sequence = installments
            .iter()
            .map(|inst| inst.sequence)
            .max()
            .unwrap_or(0)
            + 1;

        let new_balance = outstanding_principal - net;
        let new_tenure = match request.strategy {
            RecalculationStrategy::ReduceEmi => remaining_months,
            RecalculationStrategy::ReduceTenure => {
                calculate_tenure_for_emi(new_balance, annual_rate, current_emi)
            }
        };

        let replacement = AmortizationGenerator::generate_from_balance(
            new_balance,
            annual_rate,
            new_tenure,
            first_due,
            start_sequence,
        )?;
        let new_emi = replacement[0].emi_amount();

        let mut cancelled_sequences = Vec::with_capacity(tail.len());
        for idx in tail {
            installments[idx].cancel();
            cancelled_sequences.push(installments[idx].sequence);
        }
        installments.extend(replacement);

        Ok(PrepaymentOutcome {
            gross_amount: request.amount,
            fee,
            net_amount: net,
            new_outstanding_principal: new_balance,
            strategy: request.strategy,
            cancelled_sequences,
            new_emi,
            new_tenure_months: new_tenure,
        })
    }

    /// apply a foreclosure: settle matured dues, cancel the future tail,
    /// bring outstanding principal to zero
    pub fn foreclose(
        &self,
        amount: Money,
        date: NaiveDate,
        disbursement_date: NaiveDate,
        outstanding_principal: Money,
        installments: &mut [ScheduledInstallment],
    ) -> Result<ForeclosureOutcome> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount { amount });
        }
        self.check_policy(date, disbursement_date)?;

        let fee = self.config.fee.fee_on(outstanding_principal);
        let matured_interest: Money = installments
            .iter()
            .filter(|inst| !inst.status.is_terminal() && inst.due_date <= date)
            .map(|inst| inst.interest_outstanding())
            .sum();
        let matured_penalty: Money = installments
            .iter()
            .filter(|inst| !inst.status.is_terminal() && inst.due_date <= date)
            .map(|inst| inst.penalty_outstanding())
            .sum();
        let payoff = outstanding_principal + matured_interest + matured_penalty;
        let required = payoff + fee;

        if amount < required {
            return Err(LedgerError::InsufficientPayoff {
                required,
                provided: amount,
            });
        }

        let mut settled_sequences = Vec::new();
        let mut cancelled_sequences = Vec::new();
        for inst in installments.iter_mut() {
            if inst.status.is_terminal() {
                continue;
            }
            if inst.due_date <= date {
                // matured dues are collected in full as part of the payoff
                let outstanding = inst.total_outstanding();
                inst.receive_penalty(outstanding);
                inst.receive_interest(outstanding);
                inst.receive_principal(outstanding);
                inst.last_payment_date = Some(date);
                inst.status = inst.derived_status(date, 0);
                settled_sequences.push(inst.sequence);
            } else {
                inst.cancel();
                cancelled_sequences.push(inst.sequence);
            }
        }

        Ok(ForeclosureOutcome {
            payoff,
            fee,
            excess: amount - required,
            matured_interest,
            matured_penalty,
            cancelled_sequences,
            settled_sequences,
        })
    }
}

fn has_matured_dues(installments: &[ScheduledInstallment], as_of: NaiveDate) -> bool {
    installments.iter().any(|inst| {
        !inst.status.is_terminal() && inst.due_date <= as_of && !inst.total_outstanding().is_zero()
    })
}

/// months needed to clear a balance at the given EMI, reducing balance
fn calculate_tenure_for_emi(balance: Money, annual_rate: Rate, emi: Money) -> u32 {
    let monthly_rate = annual_rate.monthly_rate().as_decimal();
    let mut remaining = balance;
    let mut months = 0;

    while remaining.is_positive() && months < 600 {
        let interest = Money::from_decimal(remaining.as_decimal() * monthly_rate);
        let principal = emi - interest;
        if !principal.is_positive() {
            break;
        }
        remaining = Money::from_decimal(
            (remaining.as_decimal() - principal.as_decimal()).max(Decimal::ZERO),
        );
        months += 1;
    }

    months.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrepaymentFeeType;
    use crate::types::InstallmentStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule() -> Vec<ScheduledInstallment> {
        let terms = crate::terms::LoanTerms::new(
            Money::from_major(120_000),
            Rate::from_percentage(12),
            12,
            date(2024, 1, 1),
            date(2024, 2, 1),
        )
        .unwrap();
        AmortizationGenerator::generate(&terms).unwrap()
    }

    fn settle_first_n(installments: &mut [ScheduledInstallment], n: usize) -> Money {
        let mut principal_collected = Money::ZERO;
        for inst in installments.iter_mut().take(n) {
            let due = inst.total_outstanding();
            inst.receive_interest(due);
            inst.receive_principal(due);
            inst.last_payment_date = Some(inst.due_date);
            inst.status = InstallmentStatus::Paid;
            principal_collected += inst.principal_paid;
        }
        principal_collected
    }

    #[test]
    fn test_lock_in_rejected() {
        let config = PrepaymentConfig {
            allow_prepayment: true,
            lock_in_months: 6,
            fee: PrepaymentFeeType::None,
            min_amount: None,
            max_amount: None,
        };
        let handler = PrepaymentHandler::new(config);
        let mut installments = schedule();

        let err = handler
            .part_prepay(
                PrepaymentRequest {
                    amount: Money::from_major(20_000),
                    date: date(2024, 3, 15),
                    strategy: RecalculationStrategy::ReduceEmi,
                },
                Rate::from_percentage(12),
                date(2024, 1, 1),
                Money::from_major(120_000),
                &mut installments,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::PrepaymentNotAllowed { .. }));
    }

    #[test]
    fn test_disabled_prepayment_rejected() {
        let config = PrepaymentConfig {
            allow_prepayment: false,
            ..PrepaymentConfig::unrestricted()
        };
        let handler = PrepaymentHandler::new(config);
        let mut installments = schedule();

        let err = handler
            .part_prepay(
                PrepaymentRequest {
                    amount: Money::from_major(20_000),
                    date: date(2024, 7, 15),
                    strategy: RecalculationStrategy::ReduceEmi,
                },
                Rate::from_percentage(12),
                date(2024, 1, 1),
                Money::from_major(120_000),
                &mut installments,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::PrepaymentNotAllowed { .. }));
    }

    #[test]
    fn test_amount_bounds_enforced() {
        let config = PrepaymentConfig {
            allow_prepayment: true,
            lock_in_months: 0,
            fee: PrepaymentFeeType::None,
            min_amount: Some(Money::from_major(5_000)),
            max_amount: Some(Money::from_major(50_000)),
        };
        let handler = PrepaymentHandler::new(config);
        let mut installments = schedule();

        let err = handler
            .part_prepay(
                PrepaymentRequest {
                    amount: Money::from_major(1_000),
                    date: date(2024, 1, 15),
                    strategy: RecalculationStrategy::ReduceEmi,
                },
                Rate::from_percentage(12),
                date(2024, 1, 1),
                Money::from_major(120_000),
                &mut installments,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::AmountOutOfRange { .. }));
    }

    #[test]
    fn test_reduce_emi_keeps_tenure() {
        let handler = PrepaymentHandler::new(PrepaymentConfig::unrestricted());
        let mut installments = schedule();
        settle_first_n(&mut installments, 6);
        // after six EMIs the balance sits at the ending balance of period 6
        let outstanding: Money = installments
            .iter()
            .filter(|inst| !inst.status.is_terminal())
            .map(|inst| inst.principal_outstanding())
            .sum();

        let outcome = handler
            .part_prepay(
                PrepaymentRequest {
                    amount: Money::from_major(20_000),
                    date: date(2024, 7, 15),
                    strategy: RecalculationStrategy::ReduceEmi,
                },
                Rate::from_percentage(12),
                date(2024, 1, 1),
                outstanding,
                &mut installments,
            )
            .unwrap();

        assert_eq!(outcome.new_tenure_months, 6);
        assert!(outcome.new_emi < Money::from_str_exact("10661.85").unwrap());
        assert_eq!(outcome.cancelled_sequences, vec![7, 8, 9, 10, 11, 12]);

        // replacement dues amortize exactly the reduced balance
        let regenerated: Money = installments
            .iter()
            .filter(|inst| inst.status.is_payable())
            .map(|inst| inst.principal_due)
            .sum();
        assert_eq!(regenerated, outcome.new_outstanding_principal);
    }

    #[test]
    fn test_reduce_tenure_keeps_emi() {
        let handler = PrepaymentHandler::new(PrepaymentConfig::unrestricted());
        let mut installments = schedule();
        settle_first_n(&mut installments, 6);
        let outstanding: Money = installments
            .iter()
            .filter(|inst| !inst.status.is_terminal())
            .map(|inst| inst.principal_outstanding())
            .sum();

        let outcome = handler
            .part_prepay(
                PrepaymentRequest {
                    amount: Money::from_major(30_000),
                    date: date(2024, 7, 15),
                    strategy: RecalculationStrategy::ReduceTenure,
                },
                Rate::from_percentage(12),
                date(2024, 1, 1),
                outstanding,
                &mut installments,
            )
            .unwrap();

        // the tenure shrinks to what the old EMI can clear, then the
        // regenerated schedule re-levels the EMI at that tenure
        assert!(outcome.new_tenure_months < 6);
        assert!(outcome.new_emi <= Money::from_str_exact("10661.85").unwrap());

        let regenerated: Money = installments
            .iter()
            .filter(|inst| inst.status.is_payable())
            .map(|inst| inst.principal_due)
            .sum();
        assert_eq!(regenerated, outcome.new_outstanding_principal);
    }

    #[test]
    fn test_prepay_blocked_while_overdue() {
        let handler = PrepaymentHandler::new(PrepaymentConfig::unrestricted());
        let mut installments = schedule();
        // installment 1 matured and unpaid

        let err = handler
            .part_prepay(
                PrepaymentRequest {
                    amount: Money::from_major(20_000),
                    date: date(2024, 2, 20),
                    strategy: RecalculationStrategy::ReduceEmi,
                },
                Rate::from_percentage(12),
                date(2024, 1, 1),
                Money::from_major(120_000),
                &mut installments,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::PrepaymentNotAllowed { .. }));
    }

    #[test]
    fn test_foreclosure_at_period_seven() {
        let handler = PrepaymentHandler::new(PrepaymentConfig::unrestricted());
        let mut installments = schedule();
        settle_first_n(&mut installments, 6);
        let outstanding: Money = installments
            .iter()
            .filter(|inst| !inst.status.is_terminal())
            .map(|inst| inst.principal_outstanding())
            .sum();

        let outcome = handler
            .foreclose(
                outstanding,
                date(2024, 7, 15),
                date(2024, 1, 1),
                outstanding,
                &mut installments,
            )
            .unwrap();

        assert_eq!(outcome.payoff, outstanding);
        assert!(outcome.fee.is_zero());
        assert!(outcome.excess.is_zero());
        assert_eq!(outcome.cancelled_sequences, vec![7, 8, 9, 10, 11, 12]);
        assert!(outcome.settled_sequences.is_empty());
        for inst in &installments[6..] {
            assert_eq!(inst.status, InstallmentStatus::Cancelled);
        }
    }

    #[test]
    fn test_foreclosure_requires_full_payoff() {
        let handler = PrepaymentHandler::new(PrepaymentConfig::unrestricted());
        let mut installments = schedule();

        let err = handler
            .foreclose(
                Money::from_major(100_000),
                date(2024, 1, 15),
                date(2024, 1, 1),
                Money::from_major(120_000),
                &mut installments,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPayoff { .. }));
    }

    #[test]
    fn test_foreclosure_collects_matured_dues() {
        let handler = PrepaymentHandler::new(PrepaymentConfig::unrestricted());
        let mut installments = schedule();
        installments[0].penalty_due = Money::from_major(200);
        installments[0].penalty_applied = true;
        installments[0].status = InstallmentStatus::Overdue;

        let outstanding = Money::from_major(120_000);
        let emi_charges = Money::from_str_exact("1200.00").unwrap() + Money::from_major(200);
        let required = outstanding + emi_charges;

        let outcome = handler
            .foreclose(
                required,
                date(2024, 2, 10),
                date(2024, 1, 1),
                outstanding,
                &mut installments,
            )
            .unwrap();

        assert_eq!(outcome.payoff, required);
        assert_eq!(outcome.settled_sequences, vec![1]);
        assert!(installments[0].is_settled());
        assert_eq!(installments[0].status, InstallmentStatus::PaidLate);
    }
}
