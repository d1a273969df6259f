use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::ledger::LedgerAggregate;
use crate::schedule::ScheduledInstallment;
use crate::types::{AgingBucket, LedgerStatus, LoanId};

/// read-only statement projection for the reporting layer
///
/// a plain serializable snapshot: nothing here can mutate the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementView {
    pub loan_id: LoanId,
    pub status: LedgerStatus,
    pub version: u64,
    pub terms: TermsView,
    pub balances: BalancesView,
    pub overdue: OverdueView,
    pub last_payment_date: Option<NaiveDate>,
    pub last_payment_amount: Option<Money>,
    pub actual_closure_date: Option<NaiveDate>,
    /// full installment history, cancelled rows included
    pub installments: Vec<ScheduledInstallment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsView {
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub disbursement_date: NaiveDate,
    pub restructure_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesView {
    pub outstanding_principal: Money,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
    pub unapplied_credit: Money,
    pub total_principal_repaid: Money,
    pub total_interest_repaid: Money,
    pub total_penalty_repaid: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueView {
    pub principal: Money,
    pub interest: Money,
    pub penalty: Money,
    pub total: Money,
    pub days_past_due: u32,
    pub aging_bucket: AgingBucket,
    pub consecutive_missed: u32,
}

impl StatementView {
    pub fn from_ledger(ledger: &LedgerAggregate) -> Self {
        let derived = ledger.derived();
        Self {
            loan_id: ledger.loan_id(),
            status: ledger.status(),
            version: ledger.version(),
            terms: TermsView {
                principal: ledger.original_terms().principal,
                annual_rate: ledger.terms().annual_rate,
                tenure_months: ledger.terms().tenure_months,
                disbursement_date: ledger.original_terms().disbursement_date,
                restructure_count: ledger.restructures().len(),
            },
            balances: BalancesView {
                outstanding_principal: derived.outstanding_principal,
                next_due_date: derived.next_due_date,
                next_due_amount: derived.next_due_amount,
                unapplied_credit: ledger.unapplied_credit(),
                total_principal_repaid: ledger.total_principal_repaid(),
                total_interest_repaid: ledger.total_interest_repaid(),
                total_penalty_repaid: ledger.total_penalty_repaid(),
            },
            overdue: OverdueView {
                principal: derived.overdue_principal,
                interest: derived.overdue_interest,
                penalty: derived.overdue_penalty,
                total: derived.overdue_total(),
                days_past_due: derived.days_past_due,
                aging_bucket: derived.aging_bucket,
                consecutive_missed: derived.consecutive_missed,
            },
            last_payment_date: ledger.last_payment_date(),
            last_payment_amount: ledger.last_payment_amount(),
            actual_closure_date: ledger.actual_closure_date(),
            installments: ledger.installments().to_vec(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::payments::PaymentCommand;
    use crate::terms::LoanTerms;
    use crate::types::{PaymentMethod, TransactionStatus};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_statement_reflects_ledger() {
        let terms = LoanTerms::new(
            Money::from_major(120_000),
            Rate::from_percentage(12),
            12,
            date(2024, 1, 1),
            date(2024, 2, 1),
        )
        .unwrap();
        let mut ledger = LedgerAggregate::open(terms, LedgerConfig::personal_loan()).unwrap();

        ledger
            .apply_payment(&PaymentCommand {
                idempotency_key: "pay-1".to_string(),
                amount: Money::from_str_exact("10661.85").unwrap(),
                received_at: chrono::Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(),
                method: PaymentMethod::Upi,
                status: TransactionStatus::Cleared,
            })
            .unwrap();

        let statement = StatementView::from_ledger(&ledger);

        assert_eq!(statement.loan_id, ledger.loan_id());
        assert_eq!(statement.status, LedgerStatus::Active);
        assert_eq!(
            statement.balances.outstanding_principal,
            Money::from_str_exact("110538.15").unwrap()
        );
        assert_eq!(statement.balances.next_due_date, Some(date(2024, 3, 1)));
        assert_eq!(statement.overdue.days_past_due, 0);
        assert_eq!(statement.overdue.aging_bucket, AgingBucket::Current);
        assert_eq!(statement.installments.len(), 12);
        assert_eq!(statement.last_payment_date, Some(date(2024, 2, 1)));

        let json = statement.to_json_pretty().unwrap();
        assert!(json.contains("outstanding_principal"));
    }
}
