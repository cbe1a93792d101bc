use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Amount;

pub const SERVICE_FEE_PERCENT: Amount = 5;
pub const DEFAULT_TOURISM_TAX_PER_NIGHT: Amount = 30_000;
/// Largest client/server total disagreement accepted without a warning.
pub const DEFAULT_PRICE_TOLERANCE: Amount = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub duration: u32,
    pub room_price_per_night: Amount,
    pub base_price: Amount,
    pub service_fee: Amount,
    pub tourism_tax_per_night: Amount,
    pub tourism_tax: Amount,
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("check-out date {check_out} must be after check-in date {check_in}")]
    InvalidDateRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("room price must be positive, got {0}")]
    NonPositivePrice(Amount),
    #[error("price for {nights} nights overflows")]
    Overflow { nights: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tourism_tax_per_night: Amount,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tourism_tax_per_night: DEFAULT_TOURISM_TAX_PER_NIGHT,
        }
    }
}

impl PricingPolicy {
    pub fn new(tourism_tax_per_night: Amount) -> Self {
        Self { tourism_tax_per_night }
    }

    pub fn quote(
        &self,
        room_price_per_night: Amount,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<PriceBreakdown, PricingError> {
        if check_out <= check_in {
            return Err(PricingError::InvalidDateRange { check_in, check_out });
        }
        if room_price_per_night <= 0 {
            return Err(PricingError::NonPositivePrice(room_price_per_night));
        }

        // Calendar dates carry no time component, so whole days is already the ceiling.
        let nights = (check_out - check_in).num_days();
        let overflow = || PricingError::Overflow { nights };

        let duration = u32::try_from(nights).map_err(|_| overflow())?;
        let base_price = room_price_per_night.checked_mul(nights).ok_or_else(overflow)?;
        let service_fee = service_fee(base_price).ok_or_else(overflow)?;
        let tourism_tax = self
            .tourism_tax_per_night
            .checked_mul(nights)
            .ok_or_else(overflow)?;
        let total = base_price
            .checked_add(service_fee)
            .and_then(|sum| sum.checked_add(tourism_tax))
            .ok_or_else(overflow)?;

        Ok(PriceBreakdown {
            duration,
            room_price_per_night,
            base_price,
            service_fee,
            tourism_tax_per_night: self.tourism_tax_per_night,
            tourism_tax,
            total,
        })
    }
}

/// `round(base * 5%)`, half rounding up, in integer arithmetic.
fn service_fee(base_price: Amount) -> Option<Amount> {
    base_price
        .checked_mul(SERVICE_FEE_PERCENT)?
        .checked_add(50)
        .map(|scaled| scaled / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn two_night_stay_is_itemized() {
        let price = PricingPolicy::default()
            .quote(1_000_000, date(2025, 11, 20), date(2025, 11, 22))
            .unwrap();

        assert_eq!(price.duration, 2);
        assert_eq!(price.base_price, 2_000_000);
        assert_eq!(price.service_fee, 100_000);
        assert_eq!(price.tourism_tax, 60_000);
        assert_eq!(price.total, 2_160_000);
    }

    #[test]
    fn inverted_or_equal_dates_are_rejected() {
        let policy = PricingPolicy::default();
        let same = policy.quote(900_000, date(2025, 11, 20), date(2025, 11, 20));
        assert!(matches!(same, Err(PricingError::InvalidDateRange { .. })));

        let inverted = policy.quote(900_000, date(2025, 11, 22), date(2025, 11, 20));
        assert_eq!(
            inverted,
            Err(PricingError::InvalidDateRange {
                check_in: date(2025, 11, 22),
                check_out: date(2025, 11, 20),
            })
        );
    }

    #[test]
    fn service_fee_rounds_half_up() {
        // 5% of 10 is 0.5, of 9 is 0.45, of 30 is 1.5
        assert_eq!(service_fee(10), Some(1));
        assert_eq!(service_fee(9), Some(0));
        assert_eq!(service_fee(30), Some(2));
        assert_eq!(service_fee(1_500_000), Some(75_000));
    }

    #[test]
    fn totals_always_add_up() {
        let policy = PricingPolicy::default();
        let check_in = date(2025, 12, 28);
        for price in [1, 99, 750_000, 899_999, 1_200_000, 1_500_000, 987_654_321] {
            for nights in [1_i64, 2, 3, 7, 30, 365] {
                let check_out = check_in + chrono::Duration::days(nights);
                let quote = policy.quote(price, check_in, check_out).unwrap();
                assert_eq!(quote.duration as i64, nights);
                assert_eq!(quote.base_price, price * nights);
                assert_eq!(quote.total, quote.base_price + quote.service_fee + quote.tourism_tax);
            }
        }
    }

    #[test]
    fn stay_crosses_month_and_year_boundaries() {
        let quote = PricingPolicy::new(0)
            .quote(1_000, date(2025, 12, 30), date(2026, 1, 2))
            .unwrap();
        assert_eq!(quote.duration, 3);
        assert_eq!(quote.tourism_tax, 0);
        assert_eq!(quote.total, 3_150);
    }

    #[test]
    fn non_positive_price_and_overflow_are_errors() {
        let policy = PricingPolicy::default();
        assert_eq!(
            policy.quote(0, date(2025, 1, 1), date(2025, 1, 2)),
            Err(PricingError::NonPositivePrice(0))
        );
        assert!(matches!(
            policy.quote(i64::MAX / 2, date(2025, 1, 1), date(2025, 1, 4)),
            Err(PricingError::Overflow { nights: 3 })
        ));
    }
}
