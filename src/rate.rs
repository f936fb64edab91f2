//! Per-block rate annualization.
//!
//! Compound markets accrue interest every block. The yearly figure depends on
//! the chain's expected block count per year and on whether accrual is
//! treated as simple or compounding. The two models diverge materially at
//! high rates, so an [`Aggregator`](crate::Aggregator) applies exactly one.

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Error;

/// How a per-block rate is turned into a yearly percentage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Annualization {
    /// `rate * blocks_per_year * 100`
    #[default]
    #[display("simple")]
    Simple,
    /// `((1 + rate) ^ blocks_per_year - 1) * 100`
    #[display("compounding")]
    Compounding,
}

impl Annualization {
    /// Annualizes `rate_per_block`, returning a percentage.
    ///
    /// The result is already scaled by 100: `4.2` means 4.2%.
    ///
    /// ```rust
    /// use lendsdk::Annualization;
    /// use rust_decimal::dec;
    ///
    /// let apy = Annualization::Simple
    ///     .annualize(dec!(0.0000001), 2_300_000)
    ///     .unwrap();
    /// assert!((apy - 23.0).abs() < 1e-9);
    /// ```
    pub fn annualize(self, rate_per_block: Decimal, blocks_per_year: u64) -> Result<f64, Error> {
        let overflow = Error::Overflow {
            operation: "annualize",
        };

        let apy = match self {
            Annualization::Simple => rate_per_block
                .checked_mul(Decimal::from(blocks_per_year))
                .and_then(|rate| rate.checked_mul(Decimal::ONE_HUNDRED))
                .and_then(|rate| rate.to_f64())
                .ok_or(overflow)?,
            Annualization::Compounding => {
                let rate = rate_per_block.to_f64().ok_or(overflow)?;
                // ln_1p/exp_m1 keep precision for tiny per-block rates
                (blocks_per_year as f64 * rate.ln_1p()).exp_m1() * 100.0
            }
        };

        if apy.is_finite() {
            Ok(apy)
        } else {
            Err(Error::Overflow {
                operation: "annualize",
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;

    const BLOCKS: u64 = 2_300_000;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_zero_rate() {
        for model in [Annualization::Simple, Annualization::Compounding] {
            assert_eq!(model.annualize(Decimal::ZERO, BLOCKS).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_simple() {
        let apy = Annualization::Simple
            .annualize(dec!(0.00001), BLOCKS)
            .unwrap();
        assert!(close(apy, 2300.0), "{apy}");

        let apy = Annualization::Simple
            .annualize(dec!(0.0000001), BLOCKS)
            .unwrap();
        assert!(close(apy, 23.0), "{apy}");
    }

    #[test]
    fn test_compounding() {
        let rate = dec!(0.0000001);
        let simple = Annualization::Simple.annualize(rate, BLOCKS).unwrap();
        let compounding = Annualization::Compounding.annualize(rate, BLOCKS).unwrap();
        // e^0.23 - 1
        assert!((compounding - 25.86).abs() < 1e-3, "{compounding}");
        assert!(compounding > simple);
    }

    #[test]
    fn test_compounding_overflow() {
        // 100% per block over a year doesn't fit in f64
        assert!(matches!(
            Annualization::Compounding.annualize(Decimal::ONE, BLOCKS),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn test_serde_names() {
        let model: Annualization = serde_json::from_str("\"compounding\"").unwrap();
        assert_eq!(model, Annualization::Compounding);
        assert_eq!(Annualization::default().to_string(), "simple");
    }
}
