use chrono::NaiveDate;

use crate::decimal::Money;
use crate::schedule::ScheduledInstallment;
use crate::types::{InstallmentStatus, PaymentAllocation};

use super::AllocationLeg;

/// distributes one cleared payment across outstanding dues
///
/// waterfall, strict order: oldest installment first; within an installment
/// penalty, then interest, then principal. Funds never reach an installment
/// that is not yet due; any leftover stays unallocated.
pub struct PaymentAllocator {
    grace_period_days: u32,
}

/// result of allocating a single transaction
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub allocation: PaymentAllocation,
    pub legs: Vec<AllocationLeg>,
    /// sequences settled by this payment, with a late flag each
    pub newly_settled: Vec<(u32, bool)>,
}

impl PaymentAllocator {
    pub fn new(grace_period_days: u32) -> Self {
        Self { grace_period_days }
    }

    /// apply `amount` received on `payment_date` to the schedule
    pub fn allocate(
        &self,
        amount: Money,
        payment_date: NaiveDate,
        installments: &mut [ScheduledInstallment],
    ) -> AllocationOutcome {
        let mut remaining = amount;
        let mut allocation = PaymentAllocation::default();
        let mut legs = Vec::new();
        let mut newly_settled = Vec::new();

        for inst in installments.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            if !inst.status.is_payable() || inst.due_date > payment_date {
                continue;
            }

            let to_penalty = inst.receive_penalty(remaining);
            remaining -= to_penalty;

            let to_interest = inst.receive_interest(remaining);
            remaining -= to_interest;

            let to_principal = inst.receive_principal(remaining);
            remaining -= to_principal;

            let leg = AllocationLeg {
                sequence: inst.sequence,
                to_penalty,
                to_interest,
                to_principal,
            };
            if leg.total().is_zero() {
                continue;
            }

            inst.last_payment_date = Some(payment_date);
            allocation.to_penalty += to_penalty;
            allocation.to_interest += to_interest;
            allocation.to_principal += to_principal;
            legs.push(leg);

            let old_status = inst.status;
            inst.status = inst.derived_status(payment_date, self.grace_period_days);
            if inst.is_settled() && !old_status.is_terminal() {
                newly_settled.push((inst.sequence, inst.status == InstallmentStatus::PaidLate));
            }
        }

        allocation.unallocated = remaining;
        debug_assert!(allocation.conserves(amount));

        AllocationOutcome {
            allocation,
            legs,
            newly_settled,
        }
    }

    /// claw back a prior allocation, leg by leg
    ///
    /// used for reversals and bounced transactions: amounts return to the
    /// outstanding columns and statuses are re-derived, so a settled
    /// installment reopens.
    pub fn rollback(
        &self,
        legs: &[AllocationLeg],
        as_of: NaiveDate,
        installments: &mut [ScheduledInstallment],
    ) {
        for leg in legs {
            if let Some(inst) = installments
                .iter_mut()
                .find(|inst| inst.sequence == leg.sequence)
            {
                inst.penalty_paid -= leg.to_penalty;
                inst.interest_paid -= leg.to_interest;
                inst.principal_paid -= leg.to_principal;
                inst.status = inst.derived_status(as_of, self.grace_period_days);
            }
        }
    }
}
