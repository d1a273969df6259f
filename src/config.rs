use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};

/// late-fee type charged once per overdue installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyFeeType {
    /// flat fee per overdue installment
    FixedAmount(Money),
    /// percentage of the unpaid EMI portion at evaluation time
    PercentageOfOverdueAmount(Rate),
}

/// penalty policy supplied by loan-product configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    pub fee: PenaltyFeeType,
    /// days after the due date before a late fee accrues
    pub grace_period_days: u32,
}

impl PenaltyConfig {
    pub fn fixed(amount: Money, grace_period_days: u32) -> Self {
        Self {
            fee: PenaltyFeeType::FixedAmount(amount),
            grace_period_days,
        }
    }

    pub fn percentage(rate: Rate, grace_period_days: u32) -> Self {
        Self {
            fee: PenaltyFeeType::PercentageOfOverdueAmount(rate),
            grace_period_days,
        }
    }
}

/// prepayment fee type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepaymentFeeType {
    None,
    FixedAmount(Money),
    PercentageOfAmount(Rate),
}

impl PrepaymentFeeType {
    /// fee charged on a prepayment of the given amount
    pub fn fee_on(&self, amount: Money) -> Money {
        match self {
            PrepaymentFeeType::None => Money::ZERO,
            PrepaymentFeeType::FixedAmount(fee) => *fee,
            PrepaymentFeeType::PercentageOfAmount(rate) => amount.at_rate(*rate),
        }
    }
}

/// prepayment/foreclosure policy supplied by loan-product configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepaymentConfig {
    pub allow_prepayment: bool,
    /// months from disbursement during which prepayment is refused
    pub lock_in_months: u32,
    pub fee: PrepaymentFeeType,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
}

impl PrepaymentConfig {
    /// prepayment open from day one, no fee, no bounds
    pub fn unrestricted() -> Self {
        Self {
            allow_prepayment: true,
            lock_in_months: 0,
            fee: PrepaymentFeeType::None,
            min_amount: None,
            max_amount: None,
        }
    }
}

/// complete product policy for one ledger
///
/// the defaulted threshold is business policy, never hard-coded; it arrives
/// here from loan-product configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub penalty: PenaltyConfig,
    pub prepayment: PrepaymentConfig,
    /// days past due after which the ledger moves to Defaulted
    pub default_dpd_threshold: u32,
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        match self.penalty.fee {
            PenaltyFeeType::FixedAmount(amount) if amount.is_negative() => {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("negative penalty fee {}", amount),
                });
            }
            PenaltyFeeType::PercentageOfOverdueAmount(rate) if rate.is_negative() => {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("negative penalty rate {}", rate),
                });
            }
            _ => {}
        }
        if let (Some(min), Some(max)) = (self.prepayment.min_amount, self.prepayment.max_amount) {
            if min > max {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("prepayment min {} exceeds max {}", min, max),
                });
            }
        }
        if self.default_dpd_threshold == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "default threshold must be at least one day".to_string(),
            });
        }
        Ok(())
    }

    /// typical unsecured personal-loan policy
    pub fn personal_loan() -> Self {
        Self {
            penalty: PenaltyConfig::percentage(Rate::from_decimal(dec!(0.02)), 3),
            prepayment: PrepaymentConfig {
                allow_prepayment: true,
                lock_in_months: 6,
                fee: PrepaymentFeeType::PercentageOfAmount(Rate::from_decimal(dec!(0.01))),
                min_amount: Some(Money::from_major(1_000)),
                max_amount: None,
            },
            default_dpd_threshold: 90,
        }
    }

    /// flat-fee late policy used by smaller ticket products
    pub fn small_ticket_loan() -> Self {
        Self {
            penalty: PenaltyConfig::fixed(Money::from_major(500), 5),
            prepayment: PrepaymentConfig::unrestricted(),
            default_dpd_threshold: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepayment_fee_types() {
        let amount = Money::from_major(50_000);
        assert_eq!(PrepaymentFeeType::None.fee_on(amount), Money::ZERO);
        assert_eq!(
            PrepaymentFeeType::FixedAmount(Money::from_major(750)).fee_on(amount),
            Money::from_major(750)
        );
        assert_eq!(
            PrepaymentFeeType::PercentageOfAmount(Rate::from_percentage(1)).fee_on(amount),
            Money::from_major(500)
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(LedgerConfig::personal_loan().validate().is_ok());
        assert!(LedgerConfig::small_ticket_loan().validate().is_ok());

        let mut bad = LedgerConfig::personal_loan();
        bad.prepayment.min_amount = Some(Money::from_major(100_000));
        bad.prepayment.max_amount = Some(Money::from_major(1_000));
        assert!(bad.validate().is_err());

        let mut bad = LedgerConfig::personal_loan();
        bad.default_dpd_threshold = 0;
        assert!(bad.validate().is_err());
    }
}
