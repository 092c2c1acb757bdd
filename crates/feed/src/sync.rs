//! Order book synchronization: snapshot bootstrap plus delta consistency.
//!
//! Each symbol's book moves through `Unsynced → SnapshotPending → Synced`
//! and drops back to `Unsynced` (book destroyed) on any detected gap. The
//! first delta seen for an unsynced symbol triggers an out-of-band REST
//! snapshot through the [`SnapshotFetcher`] collaborator; every delta after
//! that passes a per-venue sequence consistency check before it may mutate
//! the book.
//!
//! Deltas that arrive while a snapshot fetch is outstanding are handled by
//! the discard-and-self-correct policy: anything at or before the
//! snapshot's sequence point is dropped as stale by the consistency check,
//! and a delta past the expected successor reads as a gap and forces a
//! fresh bootstrap. No buffering is performed.

use std::sync::Arc;

use rust_decimal::Decimal;

use cf_core::types::{BookDelta, BookSnapshot, ExchangeId, MarketEvent, Symbol, Timestamp};

use crate::book::{BookSide, BookStore, SyncState};
use crate::dispatch::EventDispatcher;
use crate::error::{SnapshotError, SyncError};
use crate::normalize::RawBookUpdate;

/// Per-venue sequence consistency policy.
///
/// Venues differ in whether the snapshot's sequence point is guaranteed to
/// fall strictly between two consecutive deltas (window, checked once) or
/// exact successor matching is required on every update (strict, checked
/// forever). This is configuration, not structure: the same engine runs
/// both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePolicy {
    /// Updates carry a first/last identifier pair `[U, u]`. The first
    /// update after a snapshot must satisfy `U ≤ last+1 ≤ u`; every
    /// subsequent update must satisfy `U == last+1`.
    Window,
    /// Updates carry a single sequence number which must be exactly
    /// `last+1`. Anything at or below `last` is a stale duplicate.
    Strict,
}

/// Verdict of the consistency check for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqVerdict {
    /// Apply the update and adopt its last sequence.
    Accept,
    /// Already-applied duplicate; discard silently.
    Stale,
    /// One or more updates were missed; destroy and resynchronize.
    Gap,
}

/// Run the consistency check for one update against the book's last
/// applied sequence. Pure.
pub fn check_sequence(
    policy: SequencePolicy,
    last_sequence: u64,
    first_after_snapshot: bool,
    update: &RawBookUpdate,
) -> SeqVerdict {
    match policy {
        SequencePolicy::Window => {
            if first_after_snapshot {
                if update.last_sequence <= last_sequence {
                    SeqVerdict::Stale
                } else if update.first_sequence <= last_sequence + 1
                    && last_sequence + 1 <= update.last_sequence
                {
                    SeqVerdict::Accept
                } else {
                    SeqVerdict::Gap
                }
            } else if update.first_sequence == last_sequence + 1 {
                SeqVerdict::Accept
            } else {
                SeqVerdict::Gap
            }
        }
        SequencePolicy::Strict => {
            let seq = update.last_sequence;
            if seq <= last_sequence {
                SeqVerdict::Stale
            } else if seq == last_sequence + 1 {
                SeqVerdict::Accept
            } else {
                SeqVerdict::Gap
            }
        }
    }
}

/// Point-in-time book state fetched out-of-band from the delta stream.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    /// Exchange-assigned sequence identifier of the snapshot.
    pub sequence: u64,
    /// Bid levels.
    pub bids: Vec<(Decimal, Decimal)>,
    /// Ask levels.
    pub asks: Vec<(Decimal, Decimal)>,
    /// Exchange-reported snapshot time, when the venue provides one.
    pub exchange_ts: Option<Timestamp>,
}

/// Snapshot-fetch collaborator (REST on real venues).
///
/// Failures are fatal to the current bootstrap attempt only; the symbol
/// stays unsynced and the next delta retries.
#[async_trait::async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch a full book snapshot at the requested depth.
    async fn fetch(&self, native_symbol: &str, depth: u32) -> Result<RawSnapshot, SnapshotError>;
}

/// The snapshot-bootstrap + delta-consistency state machine for all
/// symbols of one connection.
///
/// Exclusively owns every book it manages; runs on the connection's
/// single-threaded message stream, so no two deltas for the same symbol
/// are ever processed concurrently.
pub struct OrderBookSynchronizer {
    exchange: ExchangeId,
    policy: SequencePolicy,
    snapshot_depth: u32,
    depth_limit: Option<usize>,
    store: BookStore,
    fetcher: Arc<dyn SnapshotFetcher>,
    dispatcher: EventDispatcher,
}

impl OrderBookSynchronizer {
    /// Create a synchronizer for one connection's symbols.
    pub fn new(
        exchange: ExchangeId,
        policy: SequencePolicy,
        snapshot_depth: u32,
        depth_limit: Option<usize>,
        fetcher: Arc<dyn SnapshotFetcher>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            exchange,
            policy,
            snapshot_depth,
            depth_limit,
            store: BookStore::new(),
            fetcher,
            dispatcher,
        }
    }

    /// The books this synchronizer owns (read-only).
    pub fn store(&self) -> &BookStore {
        &self.store
    }

    /// Process one raw book update.
    ///
    /// Bootstraps the symbol from a snapshot if no book exists, then runs
    /// the consistency check and applies the update. Emits a
    /// [`BookSnapshot`] on bootstrap and one aggregated [`BookDelta`] per
    /// accepted update with at least one level change.
    pub async fn on_delta(&mut self, update: RawBookUpdate) -> Result<(), SyncError> {
        if !self.store.contains(&update.symbol) {
            self.bootstrap(&update).await?;
        }

        let Some(book) = self.store.get_mut(&update.symbol) else {
            return Ok(());
        };

        let forced = book.just_snapshotted();
        match check_sequence(self.policy, book.last_sequence(), forced, &update) {
            SeqVerdict::Stale => {
                tracing::debug!(
                    exchange = %self.exchange,
                    symbol = %update.symbol,
                    last = book.last_sequence(),
                    received = update.last_sequence,
                    "dropping stale book update"
                );
                Ok(())
            }
            SeqVerdict::Gap => {
                tracing::warn!(
                    exchange = %self.exchange,
                    symbol = %update.symbol,
                    expected = book.last_sequence() + 1,
                    first = update.first_sequence,
                    last = update.last_sequence,
                    "missing book update detected, resetting book"
                );
                self.store.destroy(&update.symbol);
                Ok(())
            }
            SeqVerdict::Accept => {
                book.set_last_sequence(update.last_sequence);
                book.clear_just_snapshotted();

                let mut bid_changes = Vec::with_capacity(update.bids.len());
                for &(price, size) in &update.bids {
                    if let Some(change) = book.apply_level(BookSide::Bid, price, size) {
                        bid_changes.push(change);
                    }
                }
                let mut ask_changes = Vec::with_capacity(update.asks.len());
                for &(price, size) in &update.asks {
                    if let Some(change) = book.apply_level(BookSide::Ask, price, size) {
                        ask_changes.push(change);
                    }
                }
                book.enforce_depth_limit();

                // A delta that changed nothing (e.g. removals of absent
                // levels) adopts the sequence but emits no event.
                if bid_changes.is_empty() && ask_changes.is_empty() {
                    return Ok(());
                }

                self.dispatcher.deliver(MarketEvent::BookDelta(BookDelta {
                    exchange: self.exchange,
                    symbol: update.symbol.clone(),
                    bids: bid_changes,
                    asks: ask_changes,
                    first_sequence: update.first_sequence,
                    last_sequence: update.last_sequence,
                    exchange_ts: update.exchange_ts,
                    receipt_ts: update.receipt_ts,
                    forced,
                }));
                Ok(())
            }
        }
    }

    /// Force `Unsynced` for one symbol, or for every symbol on this
    /// connection when `symbol` is `None` (connection-level reset).
    pub fn reset(&mut self, symbol: Option<&Symbol>) {
        match symbol {
            Some(sym) => {
                if self.store.destroy(sym) {
                    tracing::info!(exchange = %self.exchange, symbol = %sym, "book reset");
                }
            }
            None => {
                let count = self.store.len();
                self.store.clear();
                tracing::info!(exchange = %self.exchange, count, "all books reset");
            }
        }
    }

    /// Fetch a snapshot and build a fresh book for the update's symbol.
    async fn bootstrap(&mut self, update: &RawBookUpdate) -> Result<(), SyncError> {
        tracing::info!(
            exchange = %self.exchange,
            symbol = %update.symbol,
            depth = self.snapshot_depth,
            "bootstrapping order book from snapshot"
        );

        let book = self.store.create(update.symbol.clone(), self.depth_limit);
        book.set_state(SyncState::SnapshotPending);

        let fetcher = Arc::clone(&self.fetcher);
        let snapshot = match fetcher.fetch(&update.native_symbol, self.snapshot_depth).await {
            Ok(snapshot) => snapshot,
            Err(source) => {
                // Bootstrap failed: back to unsynced, retried on the next
                // delta for this symbol.
                self.store.destroy(&update.symbol);
                return Err(SyncError::SnapshotFetch {
                    symbol: update.symbol.clone(),
                    source,
                });
            }
        };

        let Some(book) = self.store.get_mut(&update.symbol) else {
            return Ok(());
        };
        book.load_snapshot(&snapshot.bids, &snapshot.asks, snapshot.sequence);

        tracing::info!(
            exchange = %self.exchange,
            symbol = %update.symbol,
            sequence = snapshot.sequence,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "order book snapshot applied"
        );

        let event = BookSnapshot {
            exchange: self.exchange,
            symbol: update.symbol.clone(),
            bids: book.bid_levels(),
            asks: book.ask_levels(),
            sequence: snapshot.sequence,
            exchange_ts: snapshot.exchange_ts,
            receipt_ts: update.receipt_ts,
        };
        self.dispatcher.deliver(MarketEvent::BookSnapshot(event));
        Ok(())
    }
}
