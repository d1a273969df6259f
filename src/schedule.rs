use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::terms::LoanTerms;
use crate::types::InstallmentStatus;

/// one row of the repayment schedule
///
/// per component, `due == paid + waived + outstanding` at all times; a
/// cancelled installment is marked, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub principal_due: Money,
    pub interest_due: Money,
    pub penalty_due: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub penalty_paid: Money,
    pub principal_waived: Money,
    pub interest_waived: Money,
    pub penalty_waived: Money,
    pub status: InstallmentStatus,
    pub penalty_applied: bool,
    pub last_payment_date: Option<NaiveDate>,
}

impl ScheduledInstallment {
    fn new(sequence: u32, due_date: NaiveDate, principal_due: Money, interest_due: Money) -> Self {
        Self {
            sequence,
            due_date,
            principal_due,
            interest_due,
            penalty_due: Money::ZERO,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            penalty_paid: Money::ZERO,
            principal_waived: Money::ZERO,
            interest_waived: Money::ZERO,
            penalty_waived: Money::ZERO,
            status: InstallmentStatus::Pending,
            penalty_applied: false,
            last_payment_date: None,
        }
    }

    /// scheduled payment amount excluding penalties
    pub fn emi_amount(&self) -> Money {
        self.principal_due + self.interest_due
    }

    pub fn principal_outstanding(&self) -> Money {
        (self.principal_due - self.principal_paid - self.principal_waived).max(Money::ZERO)
    }

    pub fn interest_outstanding(&self) -> Money {
        (self.interest_due - self.interest_paid - self.interest_waived).max(Money::ZERO)
    }

    pub fn penalty_outstanding(&self) -> Money {
        (self.penalty_due - self.penalty_paid - self.penalty_waived).max(Money::ZERO)
    }

    pub fn total_outstanding(&self) -> Money {
        self.penalty_outstanding() + self.interest_outstanding() + self.principal_outstanding()
    }

    pub fn total_paid(&self) -> Money {
        self.penalty_paid + self.interest_paid + self.principal_paid
    }

    /// unpaid portion of the EMI (principal + interest), the penalty base
    pub fn emi_unpaid_portion(&self) -> Money {
        self.principal_outstanding() + self.interest_outstanding()
    }

    /// every due component covered by payment or waiver
    pub fn is_settled(&self) -> bool {
        self.total_outstanding().is_zero()
    }

    /// date after which the installment is late
    pub fn grace_end(&self, grace_period_days: u32) -> NaiveDate {
        self.due_date + chrono::Duration::days(grace_period_days as i64)
    }

    /// status derived from amounts and dates
    ///
    /// Waived and Cancelled are sticky and never re-derived; Paid/PaidLate
    /// follow from the amounts being settled, so they only change if a
    /// reversal claws the amounts back.
    pub fn derived_status(&self, as_of: NaiveDate, grace_period_days: u32) -> InstallmentStatus {
        match self.status {
            InstallmentStatus::Waived | InstallmentStatus::Cancelled => return self.status,
            _ => {}
        }

        if self.is_settled() {
            let late = self
                .last_payment_date
                .map(|d| d > self.grace_end(grace_period_days))
                .unwrap_or(false);
            return if late {
                InstallmentStatus::PaidLate
            } else {
                InstallmentStatus::Paid
            };
        }

        if self.total_paid().is_positive() {
            InstallmentStatus::PartiallyPaid
        } else if as_of > self.grace_end(grace_period_days) {
            InstallmentStatus::Overdue
        } else {
            InstallmentStatus::Pending
        }
    }

    /// apply funds to the penalty line, returns the amount consumed
    pub fn receive_penalty(&mut self, available: Money) -> Money {
        let applied = available.min(self.penalty_outstanding());
        self.penalty_paid += applied;
        applied
    }

    /// apply funds to the interest line, returns the amount consumed
    pub fn receive_interest(&mut self, available: Money) -> Money {
        let applied = available.min(self.interest_outstanding());
        self.interest_paid += applied;
        applied
    }

    /// apply funds to the principal line, returns the amount consumed
    pub fn receive_principal(&mut self, available: Money) -> Money {
        let applied = available.min(self.principal_outstanding());
        self.principal_paid += applied;
        applied
    }

    /// move all remaining outstanding amounts to the waived columns
    pub fn waive_remaining(&mut self) -> Money {
        let waived = self.total_outstanding();
        self.penalty_waived += self.penalty_outstanding();
        self.interest_waived += self.interest_outstanding();
        self.principal_waived += self.principal_outstanding();
        self.status = InstallmentStatus::Waived;
        waived
    }

    /// take the installment out of the live schedule (restructure/foreclosure)
    pub fn cancel(&mut self) {
        self.status = InstallmentStatus::Cancelled;
    }
}

/// reducing-balance EMI: P * r * (1+r)^n / ((1+r)^n - 1)
pub fn calculate_emi(principal: Money, annual_rate: Rate, months: u32) -> Money {
    if months == 0 {
        return principal;
    }

    let monthly_rate = annual_rate.as_decimal() / dec!(12);

    if monthly_rate.is_zero() {
        return principal / Decimal::from(months);
    }

    let r = monthly_rate;
    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + r;
    for _ in 0..months {
        compound *= base;
    }

    let numerator = principal.as_decimal() * r * compound;
    let denominator = compound - Decimal::ONE;

    Money::from_decimal(numerator / denominator)
}

/// builds installment schedules from loan terms or a mid-life balance
pub struct AmortizationGenerator;

impl AmortizationGenerator {
    /// full schedule covering exactly `tenure_months` installments
    pub fn generate(terms: &LoanTerms) -> Result<Vec<ScheduledInstallment>> {
        terms.validate()?;
        Self::generate_from_balance(
            terms.principal,
            terms.annual_rate,
            terms.tenure_months,
            terms.first_due_date,
            1,
        )
    }

    /// schedule for a remaining balance, numbered from `start_sequence`
    ///
    /// used when prepayment or restructuring discards the open tail of a
    /// schedule and rebuilds it from the reduced balance.
    pub fn generate_from_balance(
        balance: Money,
        annual_rate: Rate,
        months: u32,
        first_due_date: NaiveDate,
        start_sequence: u32,
    ) -> Result<Vec<ScheduledInstallment>> {
        if !balance.is_positive() {
            return Err(LedgerError::InvalidTerms {
                message: format!("balance must be positive, got {}", balance),
            });
        }
        if annual_rate.is_negative() {
            return Err(LedgerError::InvalidTerms {
                message: format!("rate must not be negative, got {}", annual_rate),
            });
        }
        if months < 1 {
            return Err(LedgerError::InvalidTerms {
                message: "tenure must be at least one month".to_string(),
            });
        }

        let monthly_rate = annual_rate.monthly_rate().as_decimal();
        let emi = calculate_emi(balance, annual_rate, months);

        let mut installments = Vec::with_capacity(months as usize);
        let mut remaining = balance;

        for i in 0..months {
            let due_date = add_months(first_due_date, i)?;
            let interest = Money::from_decimal(remaining.as_decimal() * monthly_rate);

            // the final installment absorbs the cumulative rounding residual
            // so that principal dues sum exactly to the balance
            let principal = if i == months - 1 {
                remaining
            } else {
                (emi - interest).min(remaining)
            };

            installments.push(ScheduledInstallment::new(
                start_sequence + i,
                due_date,
                principal,
                interest,
            ));

            remaining -= principal;
        }

        debug_assert_eq!(
            installments.iter().map(|inst| inst.principal_due).sum::<Money>(),
            balance
        );

        Ok(installments)
    }
}

fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| LedgerError::InvalidDate {
            message: format!("date overflow adding {} months to {}", months, date),
        })
}
