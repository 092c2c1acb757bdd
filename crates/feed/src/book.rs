//! L2 order book state and the per-connection book arena.
//!
//! Bids are stored with [`std::cmp::Reverse`] keys so that iteration over
//! the underlying [`BTreeMap`] yields prices in descending order (highest
//! bid first); asks use natural ordering (lowest ask first). Prices and
//! sizes are exact decimals so zero-size detection and level equality are
//! never subject to floating-point representation error.
//!
//! A book is exclusively owned by the synchronizer running on its
//! connection. The [`BookStore`] is an explicit arena keyed by canonical
//! symbol: books are created on snapshot bootstrap and destroyed (never
//! merely cleared) whenever a gap forces a full reset.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use cf_core::types::{PriceLevel, Symbol};

/// Synchronization state of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No snapshot applied; deltas cannot be accepted.
    Unsynced,
    /// A snapshot fetch has been issued and is outstanding.
    SnapshotPending,
    /// Snapshot applied; incremental deltas are being accepted.
    Synced,
}

/// Which side of the book a level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    /// Resting buy interest.
    Bid,
    /// Resting sell interest.
    Ask,
}

/// Full-depth L2 order book for one (exchange, symbol) pair.
#[derive(Debug)]
pub struct OrderBook {
    /// Bid levels: Reverse(price) -> size. Highest bid first in iteration.
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Ask levels: price -> size. Lowest ask first in iteration.
    asks: BTreeMap<Decimal, Decimal>,
    /// Exchange-assigned identifier of the last applied update.
    last_sequence: u64,
    /// Optional cap on levels retained per side.
    depth_limit: Option<usize>,
    /// Synchronization state.
    state: SyncState,
    /// Set while the book holds a fresh snapshot and no delta has been
    /// accepted against it yet; the first such delta is flagged `forced`.
    just_snapshotted: bool,
}

impl OrderBook {
    /// Create a new, empty, unsynced book.
    pub fn new(depth_limit: Option<usize>) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_sequence: 0,
            depth_limit,
            state: SyncState::Unsynced,
            just_snapshotted: false,
        }
    }

    /// Current synchronization state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Transition to a new synchronization state.
    pub fn set_state(&mut self, state: SyncState) {
        self.state = state;
    }

    /// Exchange-assigned identifier of the last applied update.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Adopt a new last-applied sequence identifier.
    pub fn set_last_sequence(&mut self, sequence: u64) {
        self.last_sequence = sequence;
    }

    /// Whether the next accepted delta is the first after a fresh snapshot.
    pub fn just_snapshotted(&self) -> bool {
        self.just_snapshotted
    }

    /// Clear the fresh-snapshot marker once a delta has been accepted.
    pub fn clear_just_snapshotted(&mut self) {
        self.just_snapshotted = false;
    }

    /// Replace the entire book contents with a snapshot.
    ///
    /// Zero-size levels in the snapshot are never stored. Sets the book
    /// `Synced` and marks it freshly snapshotted.
    pub fn load_snapshot(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        sequence: u64,
    ) {
        self.bids.clear();
        self.asks.clear();

        for &(price, size) in bids {
            if !size.is_zero() {
                self.bids.insert(Reverse(price), size);
            }
        }
        for &(price, size) in asks {
            if !size.is_zero() {
                self.asks.insert(price, size);
            }
        }

        self.enforce_depth_limit();
        self.last_sequence = sequence;
        self.state = SyncState::Synced;
        self.just_snapshotted = true;
    }

    /// Apply one level change.
    ///
    /// A zero size removes the level; the removal is reported only if the
    /// level actually existed (removing an absent level is a no-op). A
    /// non-zero size upserts the level. Returns the resulting delta entry,
    /// or `None` when nothing changed.
    pub fn apply_level(&mut self, side: BookSide, price: Decimal, size: Decimal) -> Option<PriceLevel> {
        let existed = match side {
            BookSide::Bid => {
                if size.is_zero() {
                    self.bids.remove(&Reverse(price)).is_some()
                } else {
                    self.bids.insert(Reverse(price), size);
                    true
                }
            }
            BookSide::Ask => {
                if size.is_zero() {
                    self.asks.remove(&price).is_some()
                } else {
                    self.asks.insert(price, size);
                    true
                }
            }
        };

        existed.then_some(PriceLevel::new(price, size))
    }

    /// Trim levels beyond the configured depth cap.
    ///
    /// The cap is a retention policy, not a market change, so trimmed
    /// levels produce no removal deltas.
    pub fn enforce_depth_limit(&mut self) {
        let Some(limit) = self.depth_limit else {
            return;
        };
        while self.bids.len() > limit {
            self.bids.pop_last();
        }
        while self.asks.len() > limit {
            self.asks.pop_last();
        }
    }

    /// Returns the highest bid level, if any.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next()
            .map(|(Reverse(price), size)| PriceLevel::new(*price, *size))
    }

    /// Returns the lowest ask level, if any.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(price, size)| PriceLevel::new(*price, *size))
    }

    /// All bid levels in descending price order (highest first).
    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .map(|(Reverse(price), size)| PriceLevel::new(*price, *size))
            .collect()
    }

    /// All ask levels in ascending price order (lowest first).
    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .map(|(price, size)| PriceLevel::new(*price, *size))
            .collect()
    }

    /// Returns `(bid_level_count, ask_level_count)`.
    pub fn level_count(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }
}

/// Arena of books keyed by canonical symbol, scoped to one connection.
#[derive(Debug, Default)]
pub struct BookStore {
    books: HashMap<Symbol, OrderBook>,
}

impl BookStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The book for `symbol`, if one exists.
    pub fn get(&self, symbol: &Symbol) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    /// Mutable access to the book for `symbol`, if one exists.
    pub fn get_mut(&mut self, symbol: &Symbol) -> Option<&mut OrderBook> {
        self.books.get_mut(symbol)
    }

    /// Create a fresh book for `symbol`, replacing any existing one.
    pub fn create(&mut self, symbol: Symbol, depth_limit: Option<usize>) -> &mut OrderBook {
        use std::collections::hash_map::Entry;

        let book = OrderBook::new(depth_limit);
        match self.books.entry(symbol) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(book);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(book),
        }
    }

    /// Destroy the book for `symbol`. Returns `true` if one existed.
    pub fn destroy(&mut self, symbol: &Symbol) -> bool {
        self.books.remove(symbol).is_some()
    }

    /// Destroy every book (connection-level reset).
    pub fn clear(&mut self) {
        self.books.clear();
    }

    /// Returns `true` if a book exists for `symbol`.
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.books.contains_key(symbol)
    }

    /// Number of live books.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Returns `true` if no books are live.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_size() -> impl Strategy<Value = Decimal> {
        (1i64..1_000_000i64).prop_map(|m| Decimal::new(m, 4))
    }

    fn arb_levels(
        max_levels: usize,
    ) -> impl Strategy<Value = (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>)> {
        // Bid prices below 50000, ask prices above, to avoid crossed books.
        let bids = proptest::collection::vec(
            ((10_000i64..5_000_000i64).prop_map(|m| Decimal::new(m, 2)), arb_size()),
            0..max_levels,
        );
        let asks = proptest::collection::vec(
            ((5_000_001i64..9_999_999i64).prop_map(|m| Decimal::new(m, 2)), arb_size()),
            0..max_levels,
        );
        (bids, asks)
    }

    proptest! {
        #[test]
        fn snapshot_produces_consistent_book(
            (bids, asks) in arb_levels(20),
            sequence in 1u64..10_000u64,
        ) {
            let mut book = OrderBook::new(None);
            book.load_snapshot(&bids, &asks, sequence);

            prop_assert_eq!(book.state(), SyncState::Synced);
            prop_assert_eq!(book.last_sequence(), sequence);

            let unique_bids: std::collections::BTreeSet<_> =
                bids.iter().map(|(p, _)| p).collect();
            let unique_asks: std::collections::BTreeSet<_> =
                asks.iter().map(|(p, _)| p).collect();
            let (bid_count, ask_count) = book.level_count();
            prop_assert_eq!(bid_count, unique_bids.len());
            prop_assert_eq!(ask_count, unique_asks.len());

            // Levels come out sorted best-first.
            let bid_prices: Vec<Decimal> = book.bid_levels().iter().map(|l| l.price).collect();
            let mut sorted = bid_prices.clone();
            sorted.sort_by(|a, b| b.cmp(a));
            prop_assert_eq!(bid_prices, sorted);
        }
    }

    proptest! {
        #[test]
        fn zero_size_removes_exactly_one_level(
            bid_price in (10_000i64..5_000_000i64).prop_map(|m| Decimal::new(m, 2)),
            ask_price in (5_000_001i64..9_999_999i64).prop_map(|m| Decimal::new(m, 2)),
            size in arb_size(),
        ) {
            let mut book = OrderBook::new(None);
            book.load_snapshot(&[(bid_price, size)], &[(ask_price, size)], 1);
            prop_assert_eq!(book.level_count(), (1, 1));

            let removed = book.apply_level(BookSide::Bid, bid_price, Decimal::ZERO);
            prop_assert!(removed.is_some());
            prop_assert_eq!(book.level_count(), (0, 1));

            let removed = book.apply_level(BookSide::Ask, ask_price, Decimal::ZERO);
            prop_assert!(removed.is_some());
            prop_assert_eq!(book.level_count(), (0, 0));
        }
    }
}
