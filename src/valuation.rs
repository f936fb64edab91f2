//! USD valuation of a single market.
//!
//! Supply and borrow are tracked in different units on-chain. Supply is
//! counted in market shares and has to go through the exchange rate first.
//! Borrows are already denominated in the underlying token. Keep the two
//! functions separate.

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::{
    Error,
    units::{WAD_DECIMALS, normalize},
};

/// Total supplied value in USD.
///
/// `total_supply` is in market-share units and `exchange_rate` is the WAD-scaled mantissa
/// of underlying units per share. The mantissa already absorbs the difference between
/// share and underlying decimals, so `total_supply * exchange_rate / 1e18` is in
/// underlying units.
///
/// ```rust
/// use lendsdk::{U256, valuation::total_supply_usd};
/// use rust_decimal::dec;
///
/// // 1e9 shares at 1.05 underlying each, 6-decimal token priced at $1
/// let usd = total_supply_usd(
///     U256::from(1_000_000_000u64),
///     6,
///     U256::from(1_050_000_000_000_000_000u128),
///     dec!(1),
/// )
/// .unwrap();
/// assert_eq!(usd, dec!(1050));
/// ```
pub fn total_supply_usd(
    total_supply: U256,
    decimals: u8,
    exchange_rate: U256,
    price: Decimal,
) -> Result<Decimal, Error> {
    let scaled = total_supply
        .checked_mul(exchange_rate)
        .ok_or(Error::Overflow {
            operation: "total supply * exchange rate",
        })?;
    // Normalizing by WAD and decimals at once keeps the sub-unit digits.
    let underlying = normalize(scaled, u32::from(decimals) + WAD_DECIMALS)?;
    usd_value(underlying, price)
}

/// Total borrowed value in USD.
///
/// `total_borrows` is already in the underlying token's smallest unit.
pub fn total_borrow_usd(
    total_borrows: U256,
    decimals: u8,
    price: Decimal,
) -> Result<Decimal, Error> {
    let underlying = normalize(total_borrows, u32::from(decimals))?;
    usd_value(underlying, price)
}

fn usd_value(amount: Decimal, price: Decimal) -> Result<Decimal, Error> {
    amount.checked_mul(price).ok_or(Error::Overflow {
        operation: "amount * price",
    })
}
