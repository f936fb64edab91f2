//! Network constants.
//!
//! Block interval per chain (which fixes the blocks-per-year used for
//! annualization) and the native asset sentinel.

use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Sentinel address used to key the native asset in price quotes.
pub const NATIVE_ASSET_ADDRESS: Address = address!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");
/// Display name of the native asset.
pub const NATIVE_NAME: &str = "Ethereum ETH";
/// Symbol of the native asset.
pub const NATIVE_SYMBOL: &str = "ETH";
/// Decimals of the native asset.
pub const NATIVE_DECIMALS: u8 = 18;

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Supported chains.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[display("Ethereum")]
    Mainnet,
    #[display("Ethereum ropsten")]
    Ropsten,
    #[display("Ethereum Rinkeby")]
    Rinkeby,
    #[default]
    #[display("Ethereum Görli")]
    Goerli,
    #[display("Ethereum kovan")]
    Kovan,
}

impl Chain {
    /// All supported chains.
    pub const ALL: [Chain; 5] = [
        Chain::Mainnet,
        Chain::Ropsten,
        Chain::Rinkeby,
        Chain::Goerli,
        Chain::Kovan,
    ];

    /// EIP-155 chain id.
    #[must_use]
    pub const fn id(self) -> u64 {
        match self {
            Chain::Mainnet => 1,
            Chain::Ropsten => 3,
            Chain::Rinkeby => 4,
            Chain::Goerli => 5,
            Chain::Kovan => 42,
        }
    }

    /// Looks a chain up by its id.
    #[must_use]
    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|chain| chain.id() == id)
    }

    /// Expected block interval in seconds.
    #[must_use]
    pub const fn block_time_secs(self) -> u64 {
        match self {
            Chain::Mainnet | Chain::Ropsten | Chain::Goerli => 12,
            Chain::Rinkeby => 15,
            Chain::Kovan => 4,
        }
    }

    /// Expected number of blocks produced in a year.
    #[must_use]
    pub const fn blocks_per_year(self) -> u64 {
        SECONDS_PER_YEAR / self.block_time_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_per_year() {
        assert_eq!(Chain::Mainnet.blocks_per_year(), 2_628_000);
        assert_eq!(Chain::Rinkeby.blocks_per_year(), 2_102_400);
        assert_eq!(Chain::Kovan.blocks_per_year(), 7_884_000);
    }

    #[test]
    fn test_from_id() {
        for chain in Chain::ALL {
            assert_eq!(Chain::from_id(chain.id()), Some(chain));
        }
        assert_eq!(Chain::from_id(137), None);
        assert_eq!(Chain::default(), Chain::Goerli);
        assert_eq!(Chain::Goerli.to_string(), "Ethereum Görli");
    }

    #[test]
    fn test_display_names() {
        let names: Vec<_> = Chain::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            [
                "Ethereum",
                "Ethereum ropsten",
                "Ethereum Rinkeby",
                "Ethereum Görli",
                "Ethereum kovan",
            ]
        );
    }
}
