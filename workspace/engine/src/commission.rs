use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DeskError, Result};
use crate::identity::EntityKind;

/// Largest unit price a `NUMERIC(16, 4)` price column can hold.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_874_919_423, 2_328_306, 0, false, 4); // 9_999_999_999_999_999 * 10^-4

/// Largest fee a `NUMERIC(16, 2)` commission column can hold.
pub const MAX_FEE: Decimal = Decimal::from_parts(1_874_919_423, 2_328_306, 0, false, 2); // 9_999_999_999_999_999 * 10^-2

/// Commission rates charged per kind of acting entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPolicy {
    pub customer_rate: Decimal,
    pub employee_rate: Decimal,
}

impl Default for CommissionPolicy {
    /// 20% for customers, 10% for staff trading on their own book.
    fn default() -> Self {
        Self {
            customer_rate: Decimal::new(20, 2),
            employee_rate: Decimal::new(10, 2),
        }
    }
}

impl CommissionPolicy {
    pub fn rate_for(&self, kind: EntityKind) -> Decimal {
        match kind {
            EntityKind::Customer => self.customer_rate,
            EntityKind::Employee => self.employee_rate,
        }
    }

    /// `quantity × price × rate`, rounded half away from zero to cents.
    ///
    /// A product that overflows or does not fit the fee column is a
    /// validation error.
    pub fn fee(&self, kind: EntityKind, quantity: i32, price: Decimal) -> Result<Decimal> {
        let fee = Decimal::from(quantity)
            .checked_mul(price)
            .and_then(|notional| notional.checked_mul(self.rate_for(kind)))
            .map(|fee| fee.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            .filter(|fee| fee.abs() <= MAX_FEE)
            .ok_or_else(|| DeskError::validation("price or quantity out of range"))?;
        Ok(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_default_rates() {
        let policy = CommissionPolicy::default();
        assert_eq!(policy.rate_for(EntityKind::Customer), dec("0.20"));
        assert_eq!(policy.rate_for(EntityKind::Employee), dec("0.10"));
    }

    #[test]
    fn test_fee_computation() {
        let policy = CommissionPolicy::default();
        assert_eq!(policy.fee(EntityKind::Customer, 10, dec("50.00")).unwrap(), dec("100.00"));
        assert_eq!(policy.fee(EntityKind::Employee, 10, dec("50.00")).unwrap(), dec("50.00"));
        assert_eq!(policy.fee(EntityKind::Customer, 3, dec("19.99")).unwrap(), dec("11.99"));
    }

    #[test]
    fn test_fee_rounds_half_away_from_zero() {
        let policy = CommissionPolicy::default();
        // 1 × 0.125 × 0.20 = 0.025
        assert_eq!(policy.fee(EntityKind::Customer, 1, dec("0.125")).unwrap(), dec("0.03"));
        // 1 × 0.145 × 0.10 = 0.0145
        assert_eq!(policy.fee(EntityKind::Employee, 1, dec("0.145")).unwrap(), dec("0.01"));
    }

    #[test]
    fn test_fee_out_of_range_is_rejected() {
        let policy = CommissionPolicy::default();
        assert!(matches!(
            policy.fee(EntityKind::Customer, i32::MAX, Decimal::MAX),
            Err(DeskError::Validation(_))
        ));
        // Fits a Decimal but not the fee column
        assert!(matches!(
            policy.fee(EntityKind::Customer, i32::MAX, MAX_PRICE),
            Err(DeskError::Validation(_))
        ));
        assert!(policy.fee(EntityKind::Customer, 1, MAX_PRICE).is_ok());
    }
}
