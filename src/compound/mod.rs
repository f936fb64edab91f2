//! Compound v2 market data over JSON-RPC.
//!
//! [`Client`] reads everything a valuation pass needs from a Comptroller
//! deployment:
//!
//! - the list of markets (`getAllMarkets`)
//! - per-market totals, exchange rate and per-block rates
//! - underlying token metadata
//! - oracle prices, converted to USD
//!
//! # Example
//!
//! ```no_run
//! use lendsdk::{Aggregator, AggregatorConfig, Chain, MarketBoard, compound};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = compound::Client::with_url(
//!     "https://eth.llamarpc.com",
//!     compound::MAINNET_COMPTROLLER,
//! )
//! .await?;
//! let aggregator =
//!     Aggregator::with_config(client.clone(), AggregatorConfig::for_chain(Chain::Mainnet));
//! let board = MarketBoard::new();
//!
//! aggregator.refresh(&client, &board).await?;
//! if let Some(overview) = board.latest() {
//!     println!("Total supply: ${}", overview.totals.total_supply_usd);
//! }
//! # Ok(())
//! # }
//! ```

use alloy::{
    network::Ethereum,
    primitives::{Address, U256, address},
    providers::ProviderBuilder,
    transports::TransportError,
};
use futures::future::join_all;
use rust_decimal::Decimal;

use crate::{
    Error,
    aggregator::{MarketFailure, MarketSnapshot, MarketSource, TokenRegistry},
    compound::contracts::{
        ICErc20, ICToken, IComptroller::{self, IComptrollerInstance}, IERC20Metadata,
        IPriceOracle,
    },
    market::{Market, PriceQuote, Token, Underlying},
    network::NATIVE_DECIMALS,
    units::normalize,
};

pub mod contracts;

/// Compound v2 Comptroller (Unitroller) on Ethereum mainnet.
pub const MAINNET_COMPTROLLER: Address = address!("0x3d9819210A31b4961b30EF54bE2aeD79B9c9Cd3B");

/// Decimals of the oracle's price mantissa before subtracting the token's decimals.
const ORACLE_PRICE_DECIMALS: u32 = 36;

/// JSON-RPC error code for a reverted call with revert data.
const REVERT_CODE: i64 = 3;

/// Custom provider trait rename
pub trait Provider: alloy::providers::Provider<Ethereum> + Send + Clone + 'static {}
/// Type alias for the dynamic provider.
pub type DynProvider = alloy::providers::DynProvider<Ethereum>;

impl<T> Provider for T where T: alloy::providers::Provider<Ethereum> + Send + Clone + 'static {}

/// Client for a Compound v2 deployment.
#[derive(Clone)]
pub struct Client<P>
where
    P: Provider,
{
    provider: P,
    comptroller: Address,
}

impl Client<DynProvider> {
    /// Creates a client connected to `url`.
    pub async fn with_url(url: &str, comptroller: Address) -> Result<Self, TransportError> {
        let provider = ProviderBuilder::new().connect(url).await?;
        Ok(Self::new(DynProvider::new(provider), comptroller))
    }
}

impl<P> Client<P>
where
    P: Provider,
{
    /// Creates a client with a custom provider.
    pub fn new(provider: P, comptroller: Address) -> Self {
        Self {
            provider,
            comptroller,
        }
    }

    /// Returns a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Creates a Comptroller contract instance.
    pub fn comptroller(&self) -> IComptrollerInstance<P> {
        IComptroller::new(self.comptroller, self.provider.clone())
    }

    /// Reads a market snapshot.
    ///
    /// All reads are issued concurrently.
    pub async fn market(&self, id: Address) -> Result<Market, Error> {
        let ctoken = ICToken::new(id, self.provider.clone());
        let (
            underlying,
            total_supply,
            total_borrows,
            exchange_rate,
            supply_rate_per_block,
            borrow_rate_per_block,
        ) = futures::try_join!(
            self.underlying(id),
            async { Ok::<_, Error>(ctoken.totalSupply().call().await?) },
            async { Ok::<_, Error>(ctoken.totalBorrows().call().await?) },
            async { Ok::<_, Error>(ctoken.exchangeRateStored().call().await?) },
            async { Ok::<_, Error>(ctoken.supplyRatePerBlock().call().await?) },
            async { Ok::<_, Error>(ctoken.borrowRatePerBlock().call().await?) },
        )?;

        Ok(Market {
            id,
            underlying,
            total_supply,
            total_borrows,
            exchange_rate,
            supply_rate_per_block,
            borrow_rate_per_block,
        })
    }

    /// Tells native and token-backed markets apart.
    ///
    /// The native market has no `underlying()`, so the call reverts or returns nothing.
    /// Any other failure is a failed read.
    async fn underlying(&self, id: Address) -> Result<Underlying, Error> {
        match ICErc20::new(id, self.provider.clone())
            .underlying()
            .call()
            .await
        {
            Ok(address) => Ok(Underlying::Token(address)),
            Err(err) if has_no_underlying(&err) => {
                log::debug!("{id} has no underlying ({err}), treating as native");
                Ok(Underlying::Native)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// USD price of a market's underlying, or `None` if the oracle can't price it.
    async fn quote(&self, oracle: Address, market: &Market) -> Option<(Address, Decimal)> {
        let decimals = match market.underlying {
            Underlying::Native => NATIVE_DECIMALS,
            Underlying::Token(address) => {
                match IERC20Metadata::new(address, self.provider.clone())
                    .decimals()
                    .call()
                    .await
                {
                    Ok(decimals) => decimals,
                    Err(err) => {
                        log::warn!("Unable to read decimals of {address}: {err}");
                        return None;
                    }
                }
            }
        };

        let mantissa: U256 = match IPriceOracle::new(oracle, self.provider.clone())
            .getUnderlyingPrice(market.id)
            .call()
            .await
        {
            Ok(mantissa) => mantissa,
            Err(err) => {
                log::warn!("Unable to price market {}: {err}", market.id);
                return None;
            }
        };
        if mantissa.is_zero() {
            log::warn!("Oracle has no price for market {}", market.id);
            return None;
        }

        match oracle_price(mantissa, decimals) {
            Ok(price) => Some((market.underlying.price_key(), price)),
            Err(err) => {
                log::warn!("Oracle price for market {} out of range: {err}", market.id);
                None
            }
        }
    }
}

/// Whether a failed `underlying()` call means there is no underlying token.
fn has_no_underlying(err: &alloy::contract::Error) -> bool {
    match err {
        alloy::contract::Error::ZeroData(..) | alloy::contract::Error::AbiError(_) => true,
        alloy::contract::Error::TransportError(err) => {
            err.as_error_resp().is_some_and(|payload| {
                payload.code == REVERT_CODE
                    || payload.message.to_ascii_lowercase().contains("revert")
            })
        }
        _ => false,
    }
}

/// Converts an oracle mantissa into a USD price.
///
/// The oracle scales prices so that `amount * price / 1e18` is in USD with
/// 18 decimals, regardless of the token's own decimals.
fn oracle_price(mantissa: U256, decimals: u8) -> Result<Decimal, Error> {
    normalize(
        mantissa,
        ORACLE_PRICE_DECIMALS.saturating_sub(u32::from(decimals)),
    )
}

impl<P> TokenRegistry for Client<P>
where
    P: Provider,
{
    async fn token(&self, address: Address) -> Result<Token, Error> {
        let erc20 = IERC20Metadata::new(address, self.provider.clone());
        let (name, symbol, decimals) = futures::try_join!(
            async { erc20.name().call().await },
            async { erc20.symbol().call().await },
            async { erc20.decimals().call().await },
        )
        .map_err(|err| Error::MissingMetadata {
            token: address,
            reason: err.to_string(),
        })?;

        Ok(Token {
            address,
            name,
            symbol,
            decimals,
        })
    }
}

impl<P> MarketSource for Client<P>
where
    P: Provider,
{
    /// A market whose reads fail is returned as a failure, the others are still read.
    async fn markets(&self) -> Result<Vec<MarketSnapshot>, Error> {
        let ids = self.comptroller().getAllMarkets().call().await?;
        log::debug!("Comptroller {} lists {} markets", self.comptroller, ids.len());
        let snapshots = join_all(ids.into_iter().map(|id| async move {
            self.market(id).await.map_err(|error| {
                log::debug!("Unable to read market {id}: {error}");
                MarketFailure { market: id, error }
            })
        }))
        .await;
        Ok(snapshots)
    }

    /// Markets the oracle can't price are left out of the quote.
    async fn prices(&self, markets: &[Market]) -> Result<PriceQuote, Error> {
        let oracle = self.comptroller().oracle().call().await?;
        let quotes = join_all(markets.iter().map(|market| self.quote(oracle, market))).await;
        Ok(quotes.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy::{primitives::Bytes, sol_types::SolValue, transports::mock::Asserter};
    use rust_decimal::dec;

    use super::*;
    use crate::{
        Aggregator, AggregatorConfig, MarketBoard, network::NATIVE_ASSET_ADDRESS, units::WAD,
    };

    const CUSDC: Address = address!("0x39aa39c021dfbae8fac545936693ac917d5e7563");
    const CETH: Address = address!("0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5");
    const USDC: Address = address!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    const ORACLE: Address = address!("0x50ce56a3239671ab62f185704caedf626352741e");

    /// 1e-7 per block
    const RATE: u128 = 100_000_000_000;

    fn mocked() -> (Client<DynProvider>, Asserter) {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        let client = Client::new(DynProvider::new(provider), MAINNET_COMPTROLLER);
        (client, asserter)
    }

    fn respond<T: SolValue>(asserter: &Asserter, value: T) {
        asserter.push_success(&Bytes::from(value.abi_encode()));
    }

    /// Queues the reads of `Client::market` after `underlying()`, in call order.
    fn respond_market(asserter: &Asserter, supply: U256, borrows: U256, exchange_rate: U256) {
        respond(asserter, supply);
        respond(asserter, borrows);
        respond(asserter, exchange_rate);
        respond(asserter, U256::from(RATE));
        respond(asserter, U256::from(2 * RATE));
    }

    fn respond_usdc_market(asserter: &Asserter) {
        respond(asserter, USDC);
        respond_market(
            asserter,
            U256::from(1_000_000_000u64),
            U256::from(250_000_000u64),
            U256::from(1_050_000_000_000_000_000u128),
        );
    }

    fn usdc_registry() -> HashMap<Address, Token> {
        let usdc = Token {
            address: USDC,
            name: "USD Coin".to_owned(),
            symbol: "USDC".to_owned(),
            decimals: 6,
        };
        HashMap::from([(USDC, usdc)])
    }

    #[test]
    fn test_oracle_price() {
        let test_values = [
            // USDC at $1, 6 decimals
            (U256::from(10u8).pow(U256::from(30)), 6, dec!(1)),
            // ETH at $2000, 18 decimals
            (U256::from(2000u128 * 10u128.pow(18)), 18, dec!(2000)),
            // WBTC at $65000.5, 8 decimals
            (
                U256::from(650_005u128) * U256::from(10u8).pow(U256::from(27)),
                8,
                dec!(65000.5),
            ),
        ];
        for (index, (mantissa, decimals, expect)) in test_values.into_iter().enumerate() {
            assert_eq!(
                oracle_price(mantissa, decimals).unwrap(),
                expect,
                "failed at {index}"
            );
        }
    }

    #[test]
    fn test_oracle_price_feeds_valuation() {
        // 250 USDC borrowed, priced through the oracle
        let price = oracle_price(U256::from(10u8).pow(U256::from(30)), 6).unwrap();
        let usd =
            crate::valuation::total_borrow_usd(U256::from(250_000_000u64), 6, price).unwrap();
        assert_eq!(usd, dec!(250));
    }

    #[tokio::test]
    async fn test_market_snapshot() {
        let (client, asserter) = mocked();
        respond_usdc_market(&asserter);

        let market = client.market(CUSDC).await.unwrap();
        assert_eq!(market.id, CUSDC);
        assert_eq!(market.underlying, Underlying::Token(USDC));
        assert_eq!(market.total_supply, U256::from(1_000_000_000u64));
        assert_eq!(market.total_borrows, U256::from(250_000_000u64));
        assert_eq!(
            market.exchange_rate,
            U256::from(1_050_000_000_000_000_000u128)
        );
        assert_eq!(market.supply_rate_per_block, U256::from(RATE));
        assert_eq!(market.borrow_rate_per_block, U256::from(2 * RATE));
    }

    #[tokio::test]
    async fn test_native_market_detection() {
        let (client, asserter) = mocked();

        // reverted call
        asserter.push_failure_msg("execution reverted");
        assert_eq!(client.underlying(CETH).await.unwrap(), Underlying::Native);

        // no return data
        asserter.push_success(&Bytes::new());
        assert_eq!(client.underlying(CETH).await.unwrap(), Underlying::Native);

        respond(&asserter, USDC);
        assert_eq!(
            client.underlying(CUSDC).await.unwrap(),
            Underlying::Token(USDC)
        );
    }

    #[tokio::test]
    async fn test_node_error_is_not_native() {
        let (client, asserter) = mocked();

        asserter.push_failure_msg("rate limit exceeded");
        let err = client.underlying(CUSDC).await.unwrap_err();
        assert!(err.is_network_error(), "unexpected error: {err}");

        asserter.push_failure_msg("header not found");
        let err = client.market(CUSDC).await.unwrap_err();
        assert!(err.is_network_error(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_token_metadata() {
        let (client, asserter) = mocked();
        respond(&asserter, "USD Coin".to_owned());
        respond(&asserter, "USDC".to_owned());
        respond(&asserter, U256::from(6u8));

        let token = client.token(USDC).await.unwrap();
        assert_eq!(token, usdc_registry()[&USDC]);

        respond(&asserter, "USD Coin".to_owned());
        asserter.push_failure_msg("header not found");
        assert!(matches!(
            client.token(USDC).await,
            Err(Error::MissingMetadata { token, .. }) if token == USDC
        ));
    }

    #[tokio::test]
    async fn test_unpriced_asset_left_out() {
        let (client, asserter) = mocked();
        let usdc = Market {
            id: CUSDC,
            underlying: Underlying::Token(USDC),
            total_supply: U256::from(1_000_000_000u64),
            total_borrows: U256::ZERO,
            exchange_rate: WAD,
            supply_rate_per_block: U256::ZERO,
            borrow_rate_per_block: U256::ZERO,
        };
        let eth = Market {
            id: CETH,
            underlying: Underlying::Native,
            ..usdc.clone()
        };

        respond(&asserter, ORACLE);
        // USDC: decimals, then price
        respond(&asserter, U256::from(6u8));
        respond(&asserter, U256::from(10u8).pow(U256::from(30)));
        // ETH: no price
        respond(&asserter, U256::ZERO);

        let markets = [usdc, eth];
        let prices = client.prices(&markets).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get(&USDC), Some(dec!(1)));
        assert_eq!(prices.get(&NATIVE_ASSET_ADDRESS), None);

        let pass = Aggregator::new(usdc_registry())
            .aggregate(&markets, &prices)
            .await
            .unwrap();
        assert_eq!(pass.records.len(), 1);
        assert_eq!(pass.totals.total_supply_usd, dec!(1000));
        assert!(matches!(
            pass.failures[0].error,
            Error::MissingPrice { market, asset } if market == CETH && asset == NATIVE_ASSET_ADDRESS
        ));
    }

    #[tokio::test]
    async fn test_refresh_keeps_readable_markets() {
        let (client, asserter) = mocked();

        respond(&asserter, vec![CUSDC, CETH]);
        respond_usdc_market(&asserter);
        // ETH: native, then the last read fails
        asserter.push_failure_msg("execution reverted");
        respond(&asserter, U256::from(10u128.pow(18)));
        respond(&asserter, U256::ZERO);
        respond(&asserter, WAD);
        respond(&asserter, U256::from(RATE));
        asserter.push_failure_msg("header not found");
        // prices for the readable market only
        respond(&asserter, ORACLE);
        respond(&asserter, U256::from(6u8));
        respond(&asserter, U256::from(10u8).pow(U256::from(30)));

        let aggregator = Aggregator::with_config(
            usdc_registry(),
            AggregatorConfig::default().with_blocks_per_year(2_300_000),
        );
        let board = MarketBoard::new();
        assert!(aggregator.refresh(&client, &board).await.unwrap());

        let overview = board.latest().unwrap();
        assert_eq!(overview.records.len(), 1);
        assert_eq!(overview.records[0].market, CUSDC);
        assert_eq!(overview.totals.total_supply_usd, dec!(1050));
        assert_eq!(overview.totals.total_borrow_usd, dec!(250));
        assert_eq!(overview.failures.len(), 1);
        assert_eq!(overview.failures[0].market, CETH);
        assert!(overview.failures[0].error.is_network_error());
    }
}
