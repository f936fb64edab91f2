//! Market snapshots and derived valuation records.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    network::{NATIVE_ASSET_ADDRESS, NATIVE_DECIMALS, NATIVE_NAME, NATIVE_SYMBOL},
};

/// A fungible token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Contract address, or [`NATIVE_ASSET_ADDRESS`] for the native asset.
    pub address: Address,
    pub name: String,
    pub symbol: String,
    /// Fractional digits of the smallest unit.
    pub decimals: u8,
}

impl Token {
    /// The chain's native asset.
    pub fn native() -> Self {
        Self {
            address: NATIVE_ASSET_ADDRESS,
            name: NATIVE_NAME.to_owned(),
            symbol: NATIVE_SYMBOL.to_owned(),
            decimals: NATIVE_DECIMALS,
        }
    }

    /// Returns true if this is the native asset.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_ASSET_ADDRESS
    }
}

/// What a market lends out.
///
/// Resolved once when the market is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "snake_case")]
pub enum Underlying {
    /// The chain's native asset.
    Native,
    /// An ERC-20 token at this address.
    Token(Address),
}

impl Underlying {
    /// Address used to look the underlying up in a [`PriceQuote`].
    #[must_use]
    pub fn price_key(&self) -> Address {
        match self {
            Underlying::Native => NATIVE_ASSET_ADDRESS,
            Underlying::Token(address) => *address,
        }
    }
}

/// Raw on-chain snapshot of a single market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Market contract address.
    pub id: Address,
    pub underlying: Underlying,
    /// Outstanding shares, in market units.
    pub total_supply: U256,
    /// Outstanding borrows, in underlying units.
    pub total_borrows: U256,
    /// WAD-scaled underlying units per market unit.
    pub exchange_rate: U256,
    /// WAD-scaled supply rate per block.
    pub supply_rate_per_block: U256,
    /// WAD-scaled borrow rate per block.
    pub borrow_rate_per_block: U256,
}

/// USD prices keyed by underlying address.
///
/// The native asset is keyed by [`NATIVE_ASSET_ADDRESS`]. Deserializes from a JSON object
/// mapping addresses to decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceQuote(HashMap<Address, Decimal>);

impl PriceQuote {
    /// Creates an empty quote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price of `asset`, returning the previous one.
    pub fn insert(&mut self, asset: Address, price: Decimal) -> Option<Decimal> {
        self.0.insert(asset, price)
    }

    /// Returns the price of `asset`, if quoted.
    #[must_use]
    pub fn get(&self, asset: &Address) -> Option<Decimal> {
        self.0.get(asset).copied()
    }

    /// Number of quoted assets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no asset is quoted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Address, Decimal)> for PriceQuote {
    fn from_iter<T: IntoIterator<Item = (Address, Decimal)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Valuation of one market for one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    /// Market contract address.
    pub market: Address,
    /// Underlying token (or the native asset).
    pub token: Token,
    pub total_supply_usd: Decimal,
    pub total_borrow_usd: Decimal,
    /// Supply APY in percent.
    pub supply_apy: f64,
    /// Borrow APY in percent.
    pub borrow_apy: f64,
}

impl ValuationRecord {
    #[must_use]
    pub fn decimals(&self) -> u8 {
        self.token.decimals
    }
}

/// Sum of all records in a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub total_supply_usd: Decimal,
    pub total_borrow_usd: Decimal,
}

impl PortfolioTotals {
    /// Sums `records` in order.
    pub fn sum<'a>(records: impl IntoIterator<Item = &'a ValuationRecord>) -> Result<Self, Error> {
        records
            .into_iter()
            .try_fold(Self::default(), |totals, record| totals.add(record))
    }

    fn add(self, record: &ValuationRecord) -> Result<Self, Error> {
        let overflow = || Error::Overflow {
            operation: "portfolio totals",
        };
        Ok(Self {
            total_supply_usd: self
                .total_supply_usd
                .checked_add(record.total_supply_usd)
                .ok_or_else(overflow)?,
            total_borrow_usd: self
                .total_borrow_usd
                .checked_add(record.total_borrow_usd)
                .ok_or_else(overflow)?,
        })
    }
}
