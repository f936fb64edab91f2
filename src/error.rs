//! Error types for market valuation.
//!
//! Every per-market failure carries the market (or asset) it belongs to, so a
//! pass can report which markets were dropped and why.

use std::fmt;

use alloy::{
    primitives::{Address, U256},
    transports::TransportError,
};
use rust_decimal::Decimal;

/// Fixed-point input that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RateField {
    /// Market-unit to underlying-unit exchange rate.
    #[display("exchange rate")]
    ExchangeRate,
    /// Per-block supply rate.
    #[display("supply rate per block")]
    SupplyRate,
    /// Per-block borrow rate.
    #[display("borrow rate per block")]
    BorrowRate,
}

/// Error type for valuation passes.
///
/// Data errors (`MissingPrice`, `MissingMetadata`, `MalformedRate`, `InvalidPrice`) are scoped
/// to a single market. Transport and contract errors come from the on-chain adapter.
#[derive(Debug)]
pub enum Error {
    /// The price quote has no entry for the market's underlying asset.
    MissingPrice {
        /// Market being valued
        market: Address,
        /// Underlying asset (or the native sentinel) used as price key
        asset: Address,
    },

    /// Decimals, name or symbol could not be resolved for an underlying token.
    MissingMetadata {
        /// Underlying token address
        token: Address,
        /// What went wrong while resolving it
        reason: String,
    },

    /// A per-block rate or exchange rate is outside its valid domain.
    ///
    /// Well-formed on-chain data never triggers this, but a broken market or
    /// a misconfigured source can.
    MalformedRate {
        /// Market being valued
        market: Address,
        /// Which input is malformed
        field: RateField,
        /// Raw fixed-point value as read
        value: U256,
    },

    /// The quoted price is negative.
    InvalidPrice {
        /// Asset the price was quoted for
        asset: Address,
        /// Quoted price
        price: Decimal,
    },

    /// A value left the representable range.
    Overflow {
        /// Operation that overflowed
        operation: &'static str,
    },

    /// RPC transport error.
    Transport(TransportError),

    /// Contract call error (decoding, unknown selector, etc.).
    Contract(alloy::contract::Error),

    /// A market failed under [`FailurePolicy::FailPass`](crate::FailurePolicy::FailPass).
    PassFailed {
        /// First failing market in list order
        market: Address,
        /// Underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Returns true if the error comes from missing external data.
    ///
    /// A later pass may succeed once the price feed or token registry catches up.
    #[must_use]
    pub fn is_missing_data(&self) -> bool {
        match self {
            Error::MissingPrice { .. } | Error::MissingMetadata { .. } => true,
            Error::PassFailed { source, .. } => source.is_missing_data(),
            _ => false,
        }
    }

    /// Returns true if a market input failed validation.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        match self {
            Error::MalformedRate { .. } | Error::InvalidPrice { .. } => true,
            Error::PassFailed { source, .. } => source.is_malformed(),
            _ => false,
        }
    }

    /// Returns true if this is an RPC-level error.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingPrice { market, asset } => {
                write!(f, "Missing price for {asset} (market {market})")
            }
            Error::MissingMetadata { token, reason } => {
                write!(f, "Missing metadata for token {token}: {reason}")
            }
            Error::MalformedRate {
                market,
                field,
                value,
            } => write!(f, "Malformed {field} for market {market}: {value}"),
            Error::InvalidPrice { asset, price } => {
                write!(f, "Invalid price for {asset}: {price}")
            }
            Error::Overflow { operation } => write!(f, "Overflow in {operation}"),
            Error::Transport(e) => write!(f, "Transport error: {e}"),
            Error::Contract(e) => write!(f, "Contract error: {e}"),
            Error::PassFailed { market, source } => {
                write!(f, "Pass failed at market {market}: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Contract(e) => Some(e),
            Error::PassFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<alloy::contract::Error> for Error {
    fn from(e: alloy::contract::Error) -> Self {
        match e {
            alloy::contract::Error::TransportError(e) => Error::Transport(e),
            e => Error::Contract(e),
        }
    }
}
