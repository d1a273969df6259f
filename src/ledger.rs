use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::payments::{PaymentAllocator, PaymentCommand, PaymentTransaction};
use crate::penalty::PenaltyEngine;
use crate::prepayment::{
    ForeclosureOutcome, PrepaymentHandler, PrepaymentOutcome, PrepaymentRequest,
};
use crate::restructure::{RestructureEvent, RestructureHandler, RestructureRequest};
use crate::schedule::{AmortizationGenerator, ScheduledInstallment};
use crate::status::{DerivedState, StatusRecalculator};
use crate::terms::LoanTerms;
use crate::types::{
    LedgerStatus, LoanId, PaymentAllocation, TransactionId, TransactionStatus,
};

/// acknowledgement returned for a payment command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: TransactionId,
    pub idempotency_key: String,
    pub allocation: PaymentAllocation,
    /// true when the command replayed an idempotency key; the receipt then
    /// carries the previously computed allocation
    pub duplicate: bool,
}

/// record of a write-off order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOffRecord {
    pub date: NaiveDate,
    pub reason: String,
    pub written_off_principal: Money,
}

/// the repayment ledger aggregate root
///
/// owns the schedule, the transaction log and the derived aggregates, and is
/// the only thing external callers mutate. One instance is the unit of
/// consistency and of serialization: commands against the same loan apply
/// one at a time, and `ensure_version` supports optimistic concurrency for
/// callers that load and store the aggregate around each command.
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerAggregate {
    loan_id: LoanId,
    original_terms: LoanTerms,
    current_terms: LoanTerms,
    config: LedgerConfig,
    installments: Vec<ScheduledInstallment>,
    transactions: Vec<PaymentTransaction>,
    restructures: Vec<RestructureEvent>,
    write_off: Option<WriteOffRecord>,
    derived: DerivedState,
    unapplied_credit: Money,
    total_principal_repaid: Money,
    total_interest_repaid: Money,
    total_penalty_repaid: Money,
    last_payment_date: Option<NaiveDate>,
    last_payment_amount: Option<Money>,
    actual_closure_date: Option<NaiveDate>,
    version: u64,
    #[serde(skip, default)]
    events: EventStore,
}

impl LedgerAggregate {
    /// open a ledger at disbursement: validates terms, generates the full
    /// schedule and derives the initial aggregates
    pub fn open(terms: LoanTerms, config: LedgerConfig) -> Result<Self> {
        terms.validate()?;
        config.validate()?;

        let loan_id = Uuid::new_v4();
        let mut installments = AmortizationGenerator::generate(&terms)?;

        let recalculator =
            StatusRecalculator::new(config.penalty.grace_period_days, config.default_dpd_threshold);
        let outcome = recalculator.recompute(
            &mut installments,
            terms.disbursement_date,
            LedgerStatus::Active,
        );

        let mut events = EventStore::new();
        events.emit(Event::LedgerOpened {
            loan_id,
            principal: terms.principal,
            annual_rate: terms.annual_rate,
            tenure_months: terms.tenure_months,
            first_due_date: terms.first_due_date,
        });

        info!(%loan_id, principal = %terms.principal, tenure = terms.tenure_months, "ledger opened");

        Ok(Self {
            loan_id,
            original_terms: terms.clone(),
            current_terms: terms,
            config,
            installments,
            transactions: Vec::new(),
            restructures: Vec::new(),
            write_off: None,
            derived: outcome.derived,
            unapplied_credit: Money::ZERO,
            total_principal_repaid: Money::ZERO,
            total_interest_repaid: Money::ZERO,
            total_penalty_repaid: Money::ZERO,
            last_payment_date: None,
            last_payment_amount: None,
            actual_closure_date: None,
            version: 1,
            events,
        })
    }

    /// apply one cleared payment through the allocation waterfall
    ///
    /// replaying an idempotency key is a no-op returning the prior receipt,
    /// so at-least-once delivery from an upstream gateway is safe.
    pub fn apply_payment(&mut self, command: &PaymentCommand) -> Result<PaymentReceipt> {
        if let Some(existing) = self
            .transactions
            .iter()
            .find(|txn| txn.idempotency_key == command.idempotency_key && txn.reversal_of.is_none())
        {
            debug!(key = %command.idempotency_key, "duplicate payment command, returning prior result");
            return Ok(PaymentReceipt {
                transaction_id: existing.id,
                idempotency_key: existing.idempotency_key.clone(),
                allocation: existing.allocation,
                duplicate: true,
            });
        }

        if !command.amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount {
                amount: command.amount,
            });
        }
        if command.status != TransactionStatus::Cleared {
            return Err(LedgerError::TransactionNotCleared {
                status: command.status,
            });
        }
        self.reject_if_closed()?;

        let payment_date = command.received_at.date_naive();
        let allocator = PaymentAllocator::new(self.config.penalty.grace_period_days);
        let outcome = allocator.allocate(command.amount, payment_date, &mut self.installments);

        let mut transaction = PaymentTransaction::from_command(command);
        transaction.allocation = outcome.allocation;
        transaction.legs = outcome.legs;
        let transaction_id = transaction.id;

        self.total_penalty_repaid += outcome.allocation.to_penalty;
        self.total_interest_repaid += outcome.allocation.to_interest;
        self.total_principal_repaid += outcome.allocation.to_principal;
        self.unapplied_credit += outcome.allocation.unallocated;
        self.last_payment_date = Some(payment_date);
        self.last_payment_amount = Some(command.amount);

        self.events.emit(Event::PaymentReceived {
            loan_id: self.loan_id,
            transaction_id,
            idempotency_key: command.idempotency_key.clone(),
            amount: command.amount,
            allocation: outcome.allocation,
            timestamp: command.received_at,
        });
        for (sequence, paid_late) in outcome.newly_settled {
            self.events.emit(Event::InstallmentPaid {
                loan_id: self.loan_id,
                sequence,
                paid_late,
                payment_date,
            });
        }

        self.transactions.push(transaction);
        self.recompute_and_emit(payment_date);
        self.version += 1;

        info!(%transaction_id, amount = %command.amount, "payment allocated");

        Ok(PaymentReceipt {
            transaction_id,
            idempotency_key: command.idempotency_key.clone(),
            allocation: outcome.allocation,
            duplicate: false,
        })
    }

    /// roll back a cleared transaction with a compensating entry
    ///
    /// `mark` records why: Bounced and Failed for channel outcomes reported
    /// after clearance, Reversed for an operator-ordered reversal. The
    /// original transaction keeps its allocation for audit; the compensating
    /// entry carries the claw-back.
    pub fn reverse_payment(
        &mut self,
        idempotency_key: &str,
        mark: TransactionStatus,
        reason: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<TransactionId> {
        if !matches!(
            mark,
            TransactionStatus::Bounced | TransactionStatus::Failed | TransactionStatus::Reversed
        ) {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("{:?} is not a reversal status", mark),
            });
        }

        let position = self
            .transactions
            .iter()
            .position(|txn| txn.idempotency_key == idempotency_key && txn.reversal_of.is_none())
            .ok_or_else(|| LedgerError::TransactionNotFound {
                idempotency_key: idempotency_key.to_string(),
            })?;
        match self.transactions[position].status {
            TransactionStatus::Cleared => {}
            TransactionStatus::Pending => {
                return Err(LedgerError::TransactionNotCleared {
                    status: TransactionStatus::Pending,
                })
            }
            _ => {
                return Err(LedgerError::AlreadyReversed {
                    idempotency_key: idempotency_key.to_string(),
                })
            }
        }

        let as_of = timestamp.date_naive();
        let allocator = PaymentAllocator::new(self.config.penalty.grace_period_days);
        let legs = self.transactions[position].legs.clone();
        allocator.rollback(&legs, as_of, &mut self.installments);

        let allocation = self.transactions[position].allocation;
        self.total_penalty_repaid -= allocation.to_penalty;
        self.total_interest_repaid -= allocation.to_interest;
        self.total_principal_repaid -= allocation.to_principal;
        self.unapplied_credit -= allocation.unallocated;

        let compensating = self.transactions[position].compensating(timestamp);
        let compensating_id = compensating.id;
        let original_id = self.transactions[position].id;
        let amount = self.transactions[position].amount;
        self.transactions[position].status = mark;
        self.transactions.push(compensating);

        self.events.emit(Event::PaymentReversed {
            loan_id: self.loan_id,
            original_transaction_id: original_id,
            compensating_transaction_id: compensating_id,
            amount,
            reason: reason.to_string(),
            timestamp,
        });

        self.recompute_and_emit(as_of);
        self.version += 1;

        info!(%original_id, %compensating_id, ?mark, "payment reversed");

        Ok(compensating_id)
    }

    /// evaluate late fees for every eligible installment as of a date
    ///
    /// idempotent per installment; safe to call from a recurring scheduler.
    pub fn evaluate_penalties(&mut self, as_of: NaiveDate) -> Result<Money> {
        if self.derived.status.is_closed() {
            return Ok(Money::ZERO);
        }

        let total = self.apply_penalties_inner(as_of);
        if total.is_positive() {
            self.recompute_and_emit(as_of);
            self.version += 1;
        }
        Ok(total)
    }

    /// scheduler entry point: accrue penalties and refresh overdue state
    pub fn run_daily_cycle(&mut self, time: &SafeTimeProvider) -> Result<()> {
        let as_of = time.now().date_naive();
        if self.derived.status.is_closed() {
            return Ok(());
        }
        self.apply_penalties_inner(as_of);
        self.recompute_and_emit(as_of);
        self.version += 1;
        Ok(())
    }

    fn apply_penalties_inner(&mut self, as_of: NaiveDate) -> Money {
        let engine = PenaltyEngine::new(self.config.penalty);
        let mut total = Money::ZERO;
        for inst in self.installments.iter_mut() {
            if let Some(delta) = engine.apply(inst, as_of) {
                total += delta;
                self.events.emit(Event::PenaltyApplied {
                    loan_id: self.loan_id,
                    sequence: inst.sequence,
                    amount: delta,
                    as_of,
                });
            }
        }
        total
    }

    /// lump-sum principal reduction with schedule regeneration
    pub fn prepay(&mut self, request: PrepaymentRequest) -> Result<PrepaymentOutcome> {
        self.reject_if_closed()?;

        let handler = PrepaymentHandler::new(self.config.prepayment);
        let outcome = handler.part_prepay(
            request,
            self.current_terms.annual_rate,
            self.original_terms.disbursement_date,
            self.derived.outstanding_principal,
            &mut self.installments,
        )?;

        self.total_principal_repaid += outcome.net_amount;
        self.last_payment_date = Some(request.date);
        self.last_payment_amount = Some(request.amount);

        self.events.emit(Event::PrepaymentApplied {
            loan_id: self.loan_id,
            gross_amount: outcome.gross_amount,
            fee: outcome.fee,
            new_outstanding_principal: outcome.new_outstanding_principal,
            strategy: outcome.strategy,
            date: request.date,
        });

        self.recompute_and_emit(request.date);
        self.version += 1;

        info!(net = %outcome.net_amount, strategy = ?outcome.strategy, "prepayment applied");

        Ok(outcome)
    }

    /// full early closure: settles matured dues, cancels the open tail and
    /// brings outstanding principal to zero
    pub fn foreclose(&mut self, amount: Money, date: NaiveDate) -> Result<ForeclosureOutcome> {
        self.reject_if_closed()?;

        let handler = PrepaymentHandler::new(self.config.prepayment);
        let outstanding = self.derived.outstanding_principal;
        let outcome = handler.foreclose(
            amount,
            date,
            self.original_terms.disbursement_date,
            outstanding,
            &mut self.installments,
        )?;

        self.total_principal_repaid += outstanding;
        self.total_interest_repaid += outcome.matured_interest;
        self.total_penalty_repaid += outcome.matured_penalty;
        self.unapplied_credit += outcome.excess;
        self.last_payment_date = Some(date);
        self.last_payment_amount = Some(amount);
        self.actual_closure_date = Some(date);

        let old_status = self.derived.status;
        self.derived.status = LedgerStatus::Foreclosed;
        self.events.emit(Event::LoanForeclosed {
            loan_id: self.loan_id,
            payoff_amount: outcome.payoff,
            actual_closure_date: date,
        });
        self.events.emit(Event::StatusChanged {
            loan_id: self.loan_id,
            old_status,
            new_status: LedgerStatus::Foreclosed,
        });

        self.recompute_and_emit(date);
        self.version += 1;

        info!(payoff = %outcome.payoff, "loan foreclosed");

        Ok(outcome)
    }

    /// replace the open tail of the schedule under approved new terms
    pub fn restructure(&mut self, request: RestructureRequest) -> Result<()> {
        self.reject_if_closed()?;

        let outcome =
            RestructureHandler::apply(&request, &self.current_terms, &mut self.installments)?;

        self.current_terms = outcome.record.new_terms.clone();
        self.events.emit(Event::LoanRestructured {
            loan_id: self.loan_id,
            effective_from_sequence: outcome.record.effective_from_sequence,
            new_annual_rate: outcome.record.new_terms.annual_rate,
            new_tenure_months: outcome.record.new_terms.tenure_months,
            reason: outcome.record.reason.clone(),
        });
        self.restructures.push(outcome.record);

        let as_of = request.timestamp.date_naive();
        self.recompute_and_emit(as_of);
        self.version += 1;

        info!(cancelled = outcome.cancelled_sequences.len(), "loan restructured");

        Ok(())
    }

    /// forgive the remaining dues of one installment
    pub fn waive_installment(&mut self, sequence: u32, as_of: NaiveDate) -> Result<Money> {
        self.reject_if_closed()?;

        let inst = self
            .installments
            .iter_mut()
            .find(|inst| inst.sequence == sequence)
            .ok_or(LedgerError::InstallmentNotFound { sequence })?;
        if inst.status.is_terminal() {
            return Err(LedgerError::InstallmentTerminal { sequence });
        }

        let waived = inst.waive_remaining();
        self.events.emit(Event::InstallmentWaived {
            loan_id: self.loan_id,
            sequence,
            waived_amount: waived,
        });

        self.recompute_and_emit(as_of);
        self.version += 1;
        Ok(waived)
    }

    /// terminal write-off ordered by collections
    pub fn write_off(&mut self, date: NaiveDate, reason: &str) -> Result<()> {
        self.reject_if_closed()?;

        let record = WriteOffRecord {
            date,
            reason: reason.to_string(),
            written_off_principal: self.derived.outstanding_principal,
        };
        let old_status = self.derived.status;

        self.events.emit(Event::LoanWrittenOff {
            loan_id: self.loan_id,
            written_off_principal: record.written_off_principal,
            date,
            reason: record.reason.clone(),
        });
        self.events.emit(Event::StatusChanged {
            loan_id: self.loan_id,
            old_status,
            new_status: LedgerStatus::WrittenOff,
        });

        self.write_off = Some(record);
        self.derived.status = LedgerStatus::WrittenOff;
        self.actual_closure_date = Some(date);
        self.recompute_and_emit(date);
        self.version += 1;

        info!(reason, "loan written off");

        Ok(())
    }

    /// optimistic-concurrency check for callers holding a loaded copy
    pub fn ensure_version(&self, expected: u64) -> Result<()> {
        if self.version != expected {
            return Err(LedgerError::ConcurrencyConflict {
                expected,
                actual: self.version,
            });
        }
        Ok(())
    }

    fn reject_if_closed(&self) -> Result<()> {
        if self.derived.status.is_closed() {
            return Err(LedgerError::LoanClosed {
                status: self.derived.status,
            });
        }
        Ok(())
    }

    /// every mutation funnels through here before it is considered committed
    fn recompute_and_emit(&mut self, as_of: NaiveDate) {
        let baseline = if self.derived.status.is_closed() {
            self.derived.status
        } else if !self.restructures.is_empty() {
            LedgerStatus::Restructured
        } else {
            LedgerStatus::Active
        };

        let old_status = self.derived.status;
        let recalculator = StatusRecalculator::new(
            self.config.penalty.grace_period_days,
            self.config.default_dpd_threshold,
        );
        let outcome = recalculator.recompute(&mut self.installments, as_of, baseline);
        self.derived = outcome.derived;

        for (sequence, due_date, unpaid_amount) in outcome.newly_overdue {
            self.events.emit(Event::InstallmentOverdue {
                loan_id: self.loan_id,
                sequence,
                due_date,
                unpaid_amount,
            });
        }

        if self.derived.status != old_status {
            self.events.emit(Event::StatusChanged {
                loan_id: self.loan_id,
                old_status,
                new_status: self.derived.status,
            });
            match self.derived.status {
                LedgerStatus::Defaulted => {
                    self.events.emit(Event::LoanDefaulted {
                        loan_id: self.loan_id,
                        days_past_due: self.derived.days_past_due,
                        overdue_total: self.derived.overdue_total(),
                    });
                }
                LedgerStatus::FullyRepaid => {
                    self.actual_closure_date = Some(as_of);
                    self.events.emit(Event::LoanFullyRepaid {
                        loan_id: self.loan_id,
                        closure_date: as_of,
                    });
                }
                _ => {}
            }
        }
    }

    // read accessors

    pub fn loan_id(&self) -> LoanId {
        self.loan_id
    }

    pub fn status(&self) -> LedgerStatus {
        self.derived.status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn derived(&self) -> &DerivedState {
        &self.derived
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.current_terms
    }

    pub fn original_terms(&self) -> &LoanTerms {
        &self.original_terms
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn installments(&self) -> &[ScheduledInstallment] {
        &self.installments
    }

    pub fn transactions(&self) -> &[PaymentTransaction] {
        &self.transactions
    }

    pub fn restructures(&self) -> &[RestructureEvent] {
        &self.restructures
    }

    pub fn write_off_record(&self) -> Option<&WriteOffRecord> {
        self.write_off.as_ref()
    }

    pub fn unapplied_credit(&self) -> Money {
        self.unapplied_credit
    }

    pub fn total_principal_repaid(&self) -> Money {
        self.total_principal_repaid
    }

    pub fn total_interest_repaid(&self) -> Money {
        self.total_interest_repaid
    }

    pub fn total_penalty_repaid(&self) -> Money {
        self.total_penalty_repaid
    }

    pub fn last_payment_date(&self) -> Option<NaiveDate> {
        self.last_payment_date
    }

    pub fn last_payment_amount(&self) -> Option<Money> {
        self.last_payment_amount
    }

    pub fn actual_closure_date(&self) -> Option<NaiveDate> {
        self.actual_closure_date
    }

    /// drain the events accumulated by commands since the last call
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PenaltyConfig, PrepaymentConfig};
    use crate::decimal::Rate;
    use crate::types::{InstallmentStatus, PaymentMethod, RecalculationStrategy};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn test_config() -> LedgerConfig {
        LedgerConfig {
            penalty: PenaltyConfig::percentage(Rate::from_percentage(2), 3),
            prepayment: PrepaymentConfig::unrestricted(),
            default_dpd_threshold: 90,
        }
    }

    fn open_ledger() -> LedgerAggregate {
        let terms = LoanTerms::new(
            Money::from_major(120_000),
            Rate::from_percentage(12),
            12,
            date(2024, 1, 1),
            date(2024, 2, 1),
        )
        .unwrap();
        LedgerAggregate::open(terms, test_config()).unwrap()
    }

    fn payment(key: &str, amount: &str, at: DateTime<Utc>) -> PaymentCommand {
        PaymentCommand {
            idempotency_key: key.to_string(),
            amount: Money::from_str_exact(amount).unwrap(),
            received_at: at,
            method: PaymentMethod::BankTransfer,
            status: TransactionStatus::Cleared,
        }
    }

    fn emi() -> Money {
        Money::from_str_exact("10661.85").unwrap()
    }

    #[test]
    fn test_open_generates_schedule_and_event() {
        let mut ledger = open_ledger();

        assert_eq!(ledger.installments().len(), 12);
        assert_eq!(ledger.status(), LedgerStatus::Active);
        assert_eq!(ledger.version(), 1);
        assert_eq!(ledger.derived().outstanding_principal, Money::from_major(120_000));

        let events = ledger.take_events();
        assert!(matches!(events[0], Event::LedgerOpened { .. }));
    }

    #[test]
    fn test_exact_payment_on_due_date() {
        let mut ledger = open_ledger();

        let receipt = ledger
            .apply_payment(&payment("pay-1", "10661.85", ts(2024, 2, 1)))
            .unwrap();

        assert!(!receipt.duplicate);
        assert_eq!(receipt.allocation.to_interest, Money::from_str_exact("1200.00").unwrap());
        assert_eq!(receipt.allocation.to_principal, Money::from_str_exact("9461.85").unwrap());
        assert!(receipt.allocation.unallocated.is_zero());
        assert_eq!(ledger.installments()[0].status, InstallmentStatus::Paid);
        assert_eq!(
            ledger.derived().outstanding_principal,
            Money::from_str_exact("110538.15").unwrap()
        );
        assert_eq!(ledger.derived().days_past_due, 0);
        assert_eq!(ledger.version(), 2);
    }

    #[test]
    fn test_duplicate_payment_is_noop() {
        let mut ledger = open_ledger();

        let first = ledger
            .apply_payment(&payment("pay-1", "10661.85", ts(2024, 2, 1)))
            .unwrap();
        let version_after_first = ledger.version();
        let state_after_first = ledger.derived().clone();

        // gateway retries the same notification
        let second = ledger
            .apply_payment(&payment("pay-1", "10661.85", ts(2024, 2, 1)))
            .unwrap();

        assert!(second.duplicate);
        assert_eq!(second.transaction_id, first.transaction_id);
        assert_eq!(second.allocation, first.allocation);
        assert_eq!(ledger.version(), version_after_first);
        assert_eq!(ledger.derived(), &state_after_first);
        assert_eq!(ledger.transactions().len(), 1);
    }

    #[test]
    fn test_late_payment_consumes_penalty_first() {
        let mut ledger = open_ledger();

        // ten days late: the daily cycle applies 2% of the unpaid EMI once
        let applied = ledger.evaluate_penalties(date(2024, 2, 11)).unwrap();
        assert_eq!(applied, Money::from_str_exact("213.24").unwrap());
        // re-running is a no-op
        assert_eq!(ledger.evaluate_penalties(date(2024, 2, 12)).unwrap(), Money::ZERO);

        let receipt = ledger
            .apply_payment(&payment("pay-1", "10875.09", ts(2024, 2, 11)))
            .unwrap();

        assert_eq!(receipt.allocation.to_penalty, Money::from_str_exact("213.24").unwrap());
        assert_eq!(receipt.allocation.to_interest, Money::from_str_exact("1200.00").unwrap());
        assert_eq!(receipt.allocation.to_principal, Money::from_str_exact("9461.85").unwrap());
        assert_eq!(ledger.installments()[0].status, InstallmentStatus::PaidLate);
        assert_eq!(ledger.derived().days_past_due, 0);
    }

    #[test]
    fn test_payment_conservation_with_leftover() {
        let mut ledger = open_ledger();

        let amount = Money::from_str_exact("25000.00").unwrap();
        let receipt = ledger
            .apply_payment(&payment("pay-1", "25000.00", ts(2024, 2, 1)))
            .unwrap();

        assert!(receipt.allocation.conserves(amount));
        // only installment 1 is due; the rest is unapplied credit
        assert_eq!(receipt.allocation.unallocated, amount - emi());
        assert_eq!(ledger.unapplied_credit(), amount - emi());
    }

    #[test]
    fn test_full_repayment_closes_ledger() {
        let mut ledger = open_ledger();

        for seq in 1..=11 {
            ledger
                .apply_payment(&payment(
                    &format!("pay-{seq}"),
                    "10661.85",
                    ts(2024, (seq + 1) as u32, 1),
                ))
                .unwrap();
        }
        ledger
            .apply_payment(&payment("pay-12", "10661.91", ts(2025, 1, 1)))
            .unwrap();

        assert_eq!(ledger.status(), LedgerStatus::FullyRepaid);
        assert!(ledger.derived().outstanding_principal.is_zero());
        assert_eq!(ledger.total_principal_repaid(), Money::from_major(120_000));
        assert_eq!(ledger.actual_closure_date(), Some(date(2025, 1, 1)));

        // payments on a closed loan are rejected
        let err = ledger
            .apply_payment(&payment("pay-13", "100.00", ts(2025, 2, 1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::LoanClosed { .. }));

        // but a replay of an already-applied key still answers
        let replay = ledger
            .apply_payment(&payment("pay-12", "10661.91", ts(2025, 1, 1)))
            .unwrap();
        assert!(replay.duplicate);
    }

    #[test]
    fn test_reversal_restores_state() {
        let mut ledger = open_ledger();

        let before = ledger.derived().clone();
        ledger
            .apply_payment(&payment("pay-1", "10661.85", ts(2024, 2, 1)))
            .unwrap();
        assert_eq!(ledger.installments()[0].status, InstallmentStatus::Paid);

        // the transfer bounced two days later
        let compensating_id = ledger
            .reverse_payment("pay-1", TransactionStatus::Bounced, "insufficient funds", ts(2024, 2, 3))
            .unwrap();

        assert_eq!(ledger.derived().outstanding_principal, before.outstanding_principal);
        assert_eq!(ledger.total_principal_repaid(), Money::ZERO);
        assert_eq!(ledger.installments()[0].status, InstallmentStatus::Pending);
        assert_eq!(ledger.transactions().len(), 2);
        assert_eq!(ledger.transactions()[0].status, TransactionStatus::Bounced);
        assert_eq!(ledger.transactions()[1].id, compensating_id);
        assert_eq!(ledger.transactions()[1].reversal_of, Some(ledger.transactions()[0].id));

        // a second reversal of the same key is refused
        let err = ledger
            .reverse_payment("pay-1", TransactionStatus::Reversed, "again", ts(2024, 2, 4))
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReversed { .. }));
    }

    #[test]
    fn test_overdue_then_default_status() {
        let mut ledger = open_ledger();
        let time = SafeTimeProvider::new(hourglass_rs::TimeSource::Test(ts(2024, 2, 11)));

        ledger.run_daily_cycle(&time).unwrap();
        assert_eq!(ledger.status(), LedgerStatus::ActiveOverdue);
        assert_eq!(ledger.derived().days_past_due, 10);
        assert_eq!(ledger.derived().consecutive_missed, 1);

        let time = SafeTimeProvider::new(hourglass_rs::TimeSource::Test(ts(2024, 5, 10)));
        ledger.run_daily_cycle(&time).unwrap();
        assert_eq!(ledger.status(), LedgerStatus::Defaulted);
        assert!(ledger.derived().days_past_due > 90);

        let events = ledger.take_events();
        assert!(events.iter().any(|event| matches!(event, Event::LoanDefaulted { .. })));
        // a defaulted loan still accepts payments
        assert!(ledger
            .apply_payment(&payment("cure-1", "50000.00", ts(2024, 5, 11)))
            .is_ok());
    }

    #[test]
    fn test_foreclosure_at_period_seven() {
        let mut ledger = open_ledger();
        for seq in 1..=6 {
            ledger
                .apply_payment(&payment(
                    &format!("pay-{seq}"),
                    "10661.85",
                    ts(2024, (seq + 1) as u32, 1),
                ))
                .unwrap();
        }

        let outstanding = ledger.derived().outstanding_principal;
        assert_eq!(outstanding, Money::from_str_exact("61790.56").unwrap());

        let outcome = ledger.foreclose(outstanding, date(2024, 7, 10)).unwrap();

        assert_eq!(outcome.payoff, outstanding);
        assert_eq!(ledger.status(), LedgerStatus::Foreclosed);
        assert_eq!(ledger.actual_closure_date(), Some(date(2024, 7, 10)));
        assert!(ledger.derived().outstanding_principal.is_zero());
        assert_eq!(ledger.derived().days_past_due, 0);
        for inst in &ledger.installments()[6..] {
            assert_eq!(inst.status, InstallmentStatus::Cancelled);
        }

        // no further money movement on a foreclosed loan
        let err = ledger
            .apply_payment(&payment("pay-x", "100.00", ts(2024, 8, 1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::LoanClosed { .. }));
    }

    #[test]
    fn test_prepayment_regenerates_tail() {
        let mut ledger = open_ledger();
        for seq in 1..=6 {
            ledger
                .apply_payment(&payment(
                    &format!("pay-{seq}"),
                    "10661.85",
                    ts(2024, (seq + 1) as u32, 1),
                ))
                .unwrap();
        }

        let outcome = ledger
            .prepay(PrepaymentRequest {
                amount: Money::from_major(20_000),
                date: date(2024, 7, 10),
                strategy: RecalculationStrategy::ReduceEmi,
            })
            .unwrap();

        assert_eq!(
            outcome.new_outstanding_principal,
            Money::from_str_exact("41790.56").unwrap()
        );
        assert_eq!(ledger.derived().outstanding_principal, outcome.new_outstanding_principal);
        assert_eq!(outcome.new_tenure_months, 6);
        assert!(outcome.new_emi < emi());

        // schedule invariant: live principal dues equal the new balance
        let live: Money = ledger
            .installments()
            .iter()
            .filter(|inst| inst.status.is_payable())
            .map(|inst| inst.principal_due)
            .sum();
        assert_eq!(live, outcome.new_outstanding_principal);

        // paying the whole regenerated schedule closes the loan
        let mut month = 8;
        let mut year = 2024;
        for (idx, seq) in (7..=12).enumerate() {
            let amount = ledger.installments()[6 + 6 + idx].total_outstanding();
            ledger
                .apply_payment(&PaymentCommand {
                    idempotency_key: format!("post-{seq}"),
                    amount,
                    received_at: ts(year, month, 1),
                    method: PaymentMethod::BankTransfer,
                    status: TransactionStatus::Cleared,
                })
                .unwrap();
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }
        assert_eq!(ledger.status(), LedgerStatus::FullyRepaid);
    }

    #[test]
    fn test_restructure_records_history_and_baseline() {
        let mut ledger = open_ledger();
        for seq in 1..=3 {
            ledger
                .apply_payment(&payment(
                    &format!("pay-{seq}"),
                    "10661.85",
                    ts(2024, (seq + 1) as u32, 1),
                ))
                .unwrap();
        }

        ledger
            .restructure(RestructureRequest {
                new_annual_rate: Rate::from_percentage(10),
                new_tenure_months: 18,
                effective_from_sequence: 4,
                reason: "hardship plan".to_string(),
                timestamp: ts(2024, 4, 15),
            })
            .unwrap();

        assert_eq!(ledger.status(), LedgerStatus::Restructured);
        assert_eq!(ledger.restructures().len(), 1);
        assert_eq!(ledger.terms().annual_rate, Rate::from_percentage(10));
        assert_eq!(ledger.original_terms().annual_rate, Rate::from_percentage(12));

        let live: Vec<_> = ledger
            .installments()
            .iter()
            .filter(|inst| inst.status.is_payable())
            .collect();
        assert_eq!(live.len(), 18);
        assert_eq!(live[0].sequence, 13);
    }

    #[test]
    fn test_waive_and_write_off() {
        let mut ledger = open_ledger();

        let waived = ledger.waive_installment(1, date(2024, 2, 15)).unwrap();
        assert_eq!(waived, emi());
        assert_eq!(ledger.installments()[0].status, InstallmentStatus::Waived);
        // waived principal no longer counts as outstanding
        assert_eq!(
            ledger.derived().outstanding_principal,
            Money::from_str_exact("110538.15").unwrap()
        );

        ledger.write_off(date(2024, 6, 1), "collections exhausted").unwrap();
        assert_eq!(ledger.status(), LedgerStatus::WrittenOff);
        let record = ledger.write_off_record().unwrap();
        assert_eq!(record.written_off_principal, Money::from_str_exact("110538.15").unwrap());

        let err = ledger.waive_installment(2, date(2024, 6, 2)).unwrap_err();
        assert!(matches!(err, LedgerError::LoanClosed { .. }));
    }

    #[test]
    fn test_version_counter_and_conflict() {
        let mut ledger = open_ledger();
        assert_eq!(ledger.version(), 1);
        assert!(ledger.ensure_version(1).is_ok());

        ledger
            .apply_payment(&payment("pay-1", "10661.85", ts(2024, 2, 1)))
            .unwrap();
        assert_eq!(ledger.version(), 2);

        let err = ledger.ensure_version(1).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConcurrencyConflict { expected: 1, actual: 2 }
        ));
    }

    #[test]
    fn test_rejects_uncleared_and_invalid_commands() {
        let mut ledger = open_ledger();

        let mut cmd = payment("pay-1", "100.00", ts(2024, 2, 1));
        cmd.status = TransactionStatus::Pending;
        assert!(matches!(
            ledger.apply_payment(&cmd).unwrap_err(),
            LedgerError::TransactionNotCleared { .. }
        ));

        let cmd = payment("pay-2", "0.00", ts(2024, 2, 1));
        assert!(matches!(
            ledger.apply_payment(&cmd).unwrap_err(),
            LedgerError::InvalidPaymentAmount { .. }
        ));

        assert_eq!(ledger.version(), 1);
        assert!(ledger.transactions().is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut ledger = open_ledger();
        ledger
            .apply_payment(&payment("pay-1", "10661.85", ts(2024, 2, 1)))
            .unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        let restored: LedgerAggregate = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.loan_id(), ledger.loan_id());
        assert_eq!(restored.version(), ledger.version());
        assert_eq!(restored.derived(), ledger.derived());
        assert_eq!(restored.installments(), ledger.installments());
        assert_eq!(restored.transactions(), ledger.transactions());
    }
}
