//! Latest published market overview.
//!
//! Passes can overlap: a new pass may start before the previous one has
//! finished. Each pass takes a [`Generation`] when it starts, and the board
//! only accepts results newer than what it already shows, so an overtaken
//! pass can never replace fresher data.
//!
//! Before the first publish the board holds no overview at all, which is
//! distinct from an overview whose totals are zero.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::{
    aggregator::{Aggregation, MarketFailure},
    market::{PortfolioTotals, ValuationRecord},
};

/// Monotonic pass number handed out by [`MarketBoard::begin_pass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub struct Generation(u64);

impl Generation {
    /// Returns the raw pass number.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A published aggregation pass.
#[derive(Debug)]
pub struct MarketOverview {
    pub generation: Generation,
    /// When the pass was published.
    pub computed_at: DateTime<Utc>,
    pub records: Vec<ValuationRecord>,
    pub totals: PortfolioTotals,
    pub failures: Vec<MarketFailure>,
}

/// Holds the most recent overview and notifies subscribers on change.
#[derive(Debug)]
pub struct MarketBoard {
    started: AtomicU64,
    tx: watch::Sender<Option<Arc<MarketOverview>>>,
}

impl Default for MarketBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            started: AtomicU64::new(0),
            tx,
        }
    }

    /// Starts a pass, returning its generation.
    pub fn begin_pass(&self) -> Generation {
        Generation(self.started.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Publishes the result of pass `generation`.
    ///
    /// Returns false, leaving the board untouched, if an equal or newer
    /// generation has already been published.
    pub fn publish(&self, generation: Generation, aggregation: Aggregation) -> bool {
        self.tx.send_if_modified(|current| {
            if let Some(published) = current
                .as_ref()
                .filter(|published| published.generation >= generation)
            {
                log::debug!(
                    "Dropping pass {generation}: pass {} already published",
                    published.generation
                );
                return false;
            }

            log::debug!(
                "Publishing pass {generation} with {} markets",
                aggregation.records.len()
            );
            *current = Some(Arc::new(MarketOverview {
                generation,
                computed_at: Utc::now(),
                records: aggregation.records,
                totals: aggregation.totals,
                failures: aggregation.failures,
            }));
            true
        })
    }

    /// Returns the latest overview, or `None` if nothing was published yet.
    pub fn latest(&self) -> Option<Arc<MarketOverview>> {
        self.tx.borrow().clone()
    }

    /// Subscribes to overview updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MarketOverview>>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;

    fn aggregation(supply: rust_decimal::Decimal) -> Aggregation {
        Aggregation {
            totals: PortfolioTotals {
                total_supply_usd: supply,
                total_borrow_usd: dec!(0),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_no_data_until_published() {
        let board = MarketBoard::new();
        assert!(board.latest().is_none());

        let generation = board.begin_pass();
        assert!(board.latest().is_none());

        // zero totals are still data
        assert!(board.publish(generation, Aggregation::default()));
        let overview = board.latest().unwrap();
        assert_eq!(overview.totals, PortfolioTotals::default());
        assert_eq!(overview.generation, generation);
    }

    #[test]
    fn test_generations_increase() {
        let board = MarketBoard::new();
        let first = board.begin_pass();
        let second = board.begin_pass();
        assert!(second > first);
        assert_eq!(second.get(), first.get() + 1);
    }

    #[test]
    fn test_overtaken_pass_is_dropped() {
        let board = MarketBoard::new();
        let slow = board.begin_pass();
        let fast = board.begin_pass();

        assert!(board.publish(fast, aggregation(dec!(2))));
        assert!(!board.publish(slow, aggregation(dec!(1))));

        let overview = board.latest().unwrap();
        assert_eq!(overview.generation, fast);
        assert_eq!(overview.totals.total_supply_usd, dec!(2));

        // republishing the same generation is rejected too
        assert!(!board.publish(fast, aggregation(dec!(3))));
    }

    #[test]
    fn test_in_order_passes_replace() {
        let board = MarketBoard::new();
        let first = board.begin_pass();
        assert!(board.publish(first, aggregation(dec!(1))));
        let second = board.begin_pass();
        assert!(board.publish(second, aggregation(dec!(2))));
        assert_eq!(board.latest().unwrap().totals.total_supply_usd, dec!(2));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let board = MarketBoard::new();
        let mut rx = board.subscribe();
        assert!(rx.borrow_and_update().is_none());

        let generation = board.begin_pass();
        board.publish(generation, aggregation(dec!(5)));

        rx.changed().await.unwrap();
        let overview = rx.borrow_and_update().clone().unwrap();
        assert_eq!(overview.generation, generation);
    }
}
