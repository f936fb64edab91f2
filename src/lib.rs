//! Valuation engine for Compound-style lending markets.
//!
//! Turns raw on-chain market data into USD totals and annualized rates, per
//! market and for the whole protocol.
//!
//! # Modules
//!
//! - [`units`]: integer amounts to [`Decimal`]
//! - [`valuation`]: USD supply and borrow of a single market
//! - [`rate`]: per-block rates to yearly percentages
//! - [`aggregator`]: concurrent per-market valuation and portfolio totals
//! - [`board`]: latest published pass, guarded against stale results
//! - [`compound`]: Compound v2 contracts over JSON-RPC
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use lendsdk::{
//!     Address, Aggregator, AggregatorConfig, Market, NATIVE_ASSET_ADDRESS, PriceQuote, Token, U256,
//!     Underlying, address,
//! };
//! use rust_decimal::dec;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), lendsdk::Error> {
//! let eth = Market {
//!     id: address!("0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5"),
//!     underlying: Underlying::Native,
//!     total_supply: U256::ZERO,
//!     total_borrows: U256::from(2_000_000_000_000_000_000u128),
//!     exchange_rate: U256::from(200_000_000_000_000_000_000_000_000u128),
//!     supply_rate_per_block: U256::ZERO,
//!     borrow_rate_per_block: U256::from(10_000_000_000u64),
//! };
//! let prices: PriceQuote = [(NATIVE_ASSET_ADDRESS, dec!(2000))].into_iter().collect();
//!
//! let aggregator = Aggregator::with_config(
//!     HashMap::<Address, Token>::new(),
//!     AggregatorConfig::default().with_blocks_per_year(2_628_000),
//! );
//! let pass = aggregator.aggregate(&[eth], &prices).await?;
//!
//! assert_eq!(pass.totals.total_borrow_usd, dec!(4000));
//! println!("borrow APY: {:.2}%", pass.records[0].borrow_apy);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod aggregator;
pub mod board;
pub mod compound;
mod error;
pub mod market;
pub mod network;
pub mod rate;
pub mod units;
pub mod valuation;

pub use aggregator::{
    Aggregation, Aggregator, AggregatorConfig, FailurePolicy, MarketFailure, MarketSnapshot,
    MarketSource, TokenRegistry,
};
/// reimport primitives
pub use alloy::primitives::{Address, U256, address};
pub use board::{Generation, MarketBoard, MarketOverview};
pub use error::{Error, RateField};
pub use market::{Market, PortfolioTotals, PriceQuote, Token, Underlying, ValuationRecord};
pub use network::{Chain, NATIVE_ASSET_ADDRESS};
pub use rate::Annualization;
pub use rust_decimal::Decimal;
