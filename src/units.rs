//! Conversions between on-chain integers and [`Decimal`].

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::Error;

/// Fixed-point scale of Compound mantissas (`1e18`).
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Decimals embedded in a WAD-scaled mantissa.
pub const WAD_DECIMALS: u32 = 18;

/// Largest scale a [`Decimal`] can carry.
const MAX_SCALE: u32 = 28;

/// Returns `10^exp`, or `None` if it doesn't fit in 256 bits.
fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Converts an amount in a token's smallest unit into a [`Decimal`].
///
/// Computes `raw / 10^decimals`. The whole part is exact. The fractional part keeps at most
/// 28 digits, so tokens with more decimals than that lose only sub-display precision.
///
/// Fails with [`Error::Overflow`] if the whole part exceeds [`Decimal::MAX`].
pub fn normalize(raw: U256, decimals: u32) -> Result<Decimal, Error> {
    let overflow = || Error::Overflow {
        operation: "normalize",
    };

    let (raw, scale) = if decimals > MAX_SCALE {
        let truncated = pow10(decimals - MAX_SCALE).map_or(U256::ZERO, |divisor| raw / divisor);
        (truncated, MAX_SCALE)
    } else {
        (raw, decimals)
    };

    let unit = pow10(scale).ok_or_else(overflow)?;
    let (whole, fraction) = raw.div_rem(unit);

    let whole = i128::try_from(whole).map_err(|_| overflow())?;
    let whole = Decimal::try_from_i128_with_scale(whole, 0).map_err(|_| overflow())?;
    // fraction < 10^28, which always fits the 96-bit mantissa
    let fraction = i128::try_from(fraction).map_err(|_| overflow())?;
    let fraction = Decimal::try_from_i128_with_scale(fraction, scale).map_err(|_| overflow())?;

    whole.checked_add(fraction).ok_or_else(overflow)
}

/// Converts a WAD-scaled mantissa into a plain ratio.
pub fn from_mantissa(mantissa: U256) -> Result<Decimal, Error> {
    normalize(mantissa, WAD_DECIMALS)
}
