//! Market aggregation.
//!
//! An aggregation pass values every market concurrently and then reduces
//! the records into portfolio totals:
//!
//! 1. resolve the underlying token (native markets need no lookup)
//! 2. look its USD price up in the pass's [`PriceQuote`]
//! 3. validate the fixed-point inputs
//! 4. compute USD supply/borrow and annualized rates
//!
//! Per-market failures never stop other markets from being valued. What
//! happens to them afterwards is decided by the configured [`FailurePolicy`].
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use lendsdk::{Aggregator, AggregatorConfig, Chain, Market, PriceQuote, Token};
//!
//! # async fn example(markets: Vec<Market>, prices: PriceQuote) -> Result<(), lendsdk::Error> {
//! let registry: HashMap<_, Token> = HashMap::new();
//! let aggregator =
//!     Aggregator::with_config(registry, AggregatorConfig::for_chain(Chain::Mainnet));
//!
//! let pass = aggregator.aggregate(&markets, &prices).await?;
//! println!("Total supply: ${}", pass.totals.total_supply_usd);
//! for failure in &pass.failures {
//!     println!("skipped {}: {}", failure.market, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    board::MarketBoard,
    error::RateField,
    market::{Market, PortfolioTotals, PriceQuote, Token, Underlying, ValuationRecord},
    network::Chain,
    rate::Annualization,
    units::{WAD, from_mantissa},
    valuation::{total_borrow_usd, total_supply_usd},
};

/// Resolves token metadata by address.
pub trait TokenRegistry: Send + Sync {
    /// Returns the token at `address`, or [`Error::MissingMetadata`].
    fn token(&self, address: Address) -> impl Future<Output = Result<Token, Error>> + Send;
}

/// A market read from a [`MarketSource`], or why it couldn't be read.
pub type MarketSnapshot = Result<Market, MarketFailure>;

/// Supplies raw market snapshots and prices for a pass.
pub trait MarketSource: Send + Sync {
    /// Lists all markets with their underlying already resolved.
    ///
    /// A market whose reads fail is returned as a [`MarketFailure`] in its
    /// place. Only a failure to list the markets at all fails the call.
    fn markets(&self) -> impl Future<Output = Result<Vec<MarketSnapshot>, Error>> + Send;

    /// Quotes USD prices for the underlyings of `markets`.
    ///
    /// Assets without a price may be left out of the quote.
    fn prices(&self, markets: &[Market]) -> impl Future<Output = Result<PriceQuote, Error>> + Send;
}

impl TokenRegistry for HashMap<Address, Token> {
    async fn token(&self, address: Address) -> Result<Token, Error> {
        self.get(&address)
            .cloned()
            .ok_or_else(|| Error::MissingMetadata {
                token: address,
                reason: "not in registry".to_owned(),
            })
    }
}

/// What to do with markets that fail to resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave failed markets out of the records and totals, reporting them in
    /// [`Aggregation::failures`].
    #[default]
    Exclude,
    /// Fail the whole pass with the first failure in market order.
    FailPass,
}

/// Aggregator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Expected blocks per year on the markets' chain.
    pub blocks_per_year: u64,
    pub annualization: Annualization,
    pub failure_policy: FailurePolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::for_chain(Chain::default())
    }
}

impl AggregatorConfig {
    /// Default settings using `chain`'s block rate.
    pub fn for_chain(chain: Chain) -> Self {
        Self {
            blocks_per_year: chain.blocks_per_year(),
            annualization: Annualization::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Overrides the chain's blocks per year.
    #[must_use]
    pub fn with_blocks_per_year(mut self, blocks_per_year: u64) -> Self {
        self.blocks_per_year = blocks_per_year;
        self
    }

    /// Sets the annualization model.
    #[must_use]
    pub fn with_annualization(mut self, annualization: Annualization) -> Self {
        self.annualization = annualization;
        self
    }

    /// Sets what happens to markets that fail to resolve.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// A market left out of a pass.
#[derive(Debug)]
pub struct MarketFailure {
    pub market: Address,
    pub error: Error,
}

/// Result of one aggregation pass.
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Valued markets, in input order.
    pub records: Vec<ValuationRecord>,
    pub totals: PortfolioTotals,
    /// Markets excluded under [`FailurePolicy::Exclude`], in input order.
    pub failures: Vec<MarketFailure>,
}

/// Values markets and reduces them into portfolio totals.
pub struct Aggregator<R> {
    registry: R,
    config: AggregatorConfig,
}

impl<R> Aggregator<R>
where
    R: TokenRegistry,
{
    /// Creates an aggregator with the default configuration.
    pub fn new(registry: R) -> Self {
        Self::with_config(registry, AggregatorConfig::default())
    }

    /// Creates an aggregator with `config`.
    ///
    /// ```
    /// use std::collections::HashMap;
    ///
    /// use lendsdk::{Address, Aggregator, AggregatorConfig, Annualization, Token};
    ///
    /// let config = AggregatorConfig::default().with_annualization(Annualization::Compounding);
    /// let aggregator = Aggregator::with_config(HashMap::<Address, Token>::new(), config);
    /// assert_eq!(aggregator.config().annualization, Annualization::Compounding);
    /// ```
    pub fn with_config(registry: R, config: AggregatorConfig) -> Self {
        Self { registry, config }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Returns the token registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Values a single market.
    pub async fn value_market(
        &self,
        market: &Market,
        prices: &PriceQuote,
    ) -> Result<ValuationRecord, Error> {
        let token = match market.underlying {
            Underlying::Native => Token::native(),
            Underlying::Token(address) => self.registry.token(address).await?,
        };

        let asset = market.underlying.price_key();
        let price = prices.get(&asset).ok_or(Error::MissingPrice {
            market: market.id,
            asset,
        })?;
        if price.is_sign_negative() && !price.is_zero() {
            return Err(Error::InvalidPrice { asset, price });
        }

        if market.exchange_rate.is_zero() && !market.total_supply.is_zero() {
            return Err(Error::MalformedRate {
                market: market.id,
                field: RateField::ExchangeRate,
                value: market.exchange_rate,
            });
        }
        let supply_rate = per_block_rate(
            market.id,
            RateField::SupplyRate,
            market.supply_rate_per_block,
        )?;
        let borrow_rate = per_block_rate(
            market.id,
            RateField::BorrowRate,
            market.borrow_rate_per_block,
        )?;

        let total_supply_usd = total_supply_usd(
            market.total_supply,
            token.decimals,
            market.exchange_rate,
            price,
        )?;
        let total_borrow_usd = total_borrow_usd(market.total_borrows, token.decimals, price)?;

        let AggregatorConfig {
            blocks_per_year,
            annualization,
            ..
        } = self.config;

        Ok(ValuationRecord {
            market: market.id,
            token,
            total_supply_usd,
            total_borrow_usd,
            supply_apy: annualization.annualize(supply_rate, blocks_per_year)?,
            borrow_apy: annualization.annualize(borrow_rate, blocks_per_year)?,
        })
    }

    /// Values all `markets` concurrently and sums the results.
    ///
    /// Every market is resolved before reducing. Records and totals follow the order of
    /// `markets`, so identical inputs give identical results.
    pub async fn aggregate(
        &self,
        markets: &[Market],
        prices: &PriceQuote,
    ) -> Result<Aggregation, Error> {
        log::debug!(
            "Valuing {} markets with {} quoted prices",
            markets.len(),
            prices.len()
        );

        let results = join_all(markets.iter().map(|market| async move {
            self.value_market(market, prices)
                .await
                .map_err(|error| MarketFailure {
                    market: market.id,
                    error,
                })
        }))
        .await;

        self.reduce(results)
    }

    /// Values snapshots from a [`MarketSource`].
    ///
    /// Snapshots that failed to read go through the failure policy like any
    /// other per-market failure.
    pub async fn aggregate_snapshots(
        &self,
        snapshots: Vec<MarketSnapshot>,
        prices: &PriceQuote,
    ) -> Result<Aggregation, Error> {
        log::debug!(
            "Valuing {} snapshots with {} quoted prices",
            snapshots.len(),
            prices.len()
        );

        let results = join_all(snapshots.into_iter().map(|snapshot| async move {
            match snapshot {
                Ok(market) => self
                    .value_market(&market, prices)
                    .await
                    .map_err(|error| MarketFailure {
                        market: market.id,
                        error,
                    }),
                Err(failure) => Err(failure),
            }
        }))
        .await;

        self.reduce(results)
    }

    /// Applies the failure policy and sums the valued markets, in input order.
    fn reduce(
        &self,
        results: Vec<Result<ValuationRecord, MarketFailure>>,
    ) -> Result<Aggregation, Error> {
        let mut aggregation = Aggregation::default();
        for result in results {
            match result {
                Ok(record) => aggregation.records.push(record),
                Err(MarketFailure { market, error }) => match self.config.failure_policy {
                    FailurePolicy::Exclude => {
                        log::warn!("Excluding market {market}: {error}");
                        aggregation.failures.push(MarketFailure { market, error });
                    }
                    FailurePolicy::FailPass => {
                        log::warn!("Failing pass at market {market}: {error}");
                        return Err(Error::PassFailed {
                            market,
                            source: Box::new(error),
                        });
                    }
                },
            }
        }

        aggregation.totals = PortfolioTotals::sum(&aggregation.records)?;
        log::debug!(
            "Valued {} markets ({} excluded): supply ${}, borrow ${}",
            aggregation.records.len(),
            aggregation.failures.len(),
            aggregation.totals.total_supply_usd,
            aggregation.totals.total_borrow_usd,
        );

        Ok(aggregation)
    }

    /// Runs a full pass against `source` and publishes it to `board`.
    ///
    /// Returns false if a newer pass was published while this one was in flight.
    pub async fn refresh<S>(&self, source: &S, board: &MarketBoard) -> Result<bool, Error>
    where
        S: MarketSource,
    {
        let generation = board.begin_pass();
        let snapshots = source.markets().await?;
        let markets: Vec<Market> = snapshots
            .iter()
            .filter_map(|snapshot| snapshot.as_ref().ok())
            .cloned()
            .collect();
        let prices = source.prices(&markets).await?;
        let aggregation = self.aggregate_snapshots(snapshots, &prices).await?;
        Ok(board.publish(generation, aggregation))
    }
}

/// Reads and validates a per-block rate.
///
/// A rate above 100% per block can't come from a working rate model.
fn per_block_rate(market: Address, field: RateField, value: U256) -> Result<Decimal, Error> {
    if value > WAD {
        return Err(Error::MalformedRate {
            market,
            field,
            value,
        });
    }
    from_mantissa(value)
}
