//! Canonical market-data events shared across exchange implementations.
//!
//! Exchange-specific decoders convert wire-format messages into these
//! structures; downstream consumers only ever see this schema. All prices
//! and sizes are exact decimals — sequence checks and zero-size detection
//! rely on exact equality, so binary floating point is never used.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{ExchangeId, Side, Symbol};
use super::timestamp::Timestamp;

/// One price level: a price and the aggregate size resting at it.
///
/// A size of zero is only ever seen in deltas, where it means "level
/// removed"; zero-size levels are never stored in a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price of this level.
    pub price: Decimal,
    /// Aggregate size at this level.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Incremental order book change: the levels touched by one accepted update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDelta {
    /// Source exchange.
    pub exchange: ExchangeId,
    /// Canonical instrument.
    pub symbol: Symbol,
    /// Bid levels changed by this update. Size zero means the level was removed.
    pub bids: Vec<PriceLevel>,
    /// Ask levels changed by this update. Size zero means the level was removed.
    pub asks: Vec<PriceLevel>,
    /// First sequence identifier covered by this update.
    pub first_sequence: u64,
    /// Last sequence identifier covered by this update.
    pub last_sequence: u64,
    /// Exchange-reported event time, when the venue provides one.
    pub exchange_ts: Option<Timestamp>,
    /// Local receipt time of the source frame.
    pub receipt_ts: Timestamp,
    /// `true` for the update immediately following a fresh snapshot,
    /// `false` for ordinary incremental deltas.
    pub forced: bool,
}

/// Full point-in-time order book state.
///
/// Emitted once per successful snapshot bootstrap; always precedes the
/// deltas that build on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Source exchange.
    pub exchange: ExchangeId,
    /// Canonical instrument.
    pub symbol: Symbol,
    /// All bid levels, best (highest) first.
    pub bids: Vec<PriceLevel>,
    /// All ask levels, best (lowest) first.
    pub asks: Vec<PriceLevel>,
    /// Exchange-assigned sequence identifier of the snapshot.
    pub sequence: u64,
    /// Exchange-reported time, when the venue provides one.
    pub exchange_ts: Option<Timestamp>,
    /// Local receipt time.
    pub receipt_ts: Timestamp,
}

/// Individual trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Source exchange.
    pub exchange: ExchangeId,
    /// Canonical instrument.
    pub symbol: Symbol,
    /// Exchange-assigned trade identifier.
    pub trade_id: String,
    /// Taker side (the aggressor).
    pub side: Side,
    /// Trade quantity.
    pub amount: Decimal,
    /// Trade price.
    pub price: Decimal,
    /// Exchange-reported trade time.
    pub exchange_ts: Timestamp,
    /// Local receipt time.
    pub receipt_ts: Timestamp,
}

/// Best bid/ask quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    /// Source exchange.
    pub exchange: ExchangeId,
    /// Canonical instrument.
    pub symbol: Symbol,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Exchange-reported event time. Some venues omit it on quote updates,
    /// in which case consumers fall back to `receipt_ts`.
    pub exchange_ts: Option<Timestamp>,
    /// Local receipt time.
    pub receipt_ts: Timestamp,
}

/// Forced liquidation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidation {
    /// Source exchange.
    pub exchange: ExchangeId,
    /// Canonical instrument.
    pub symbol: Symbol,
    /// Side of the liquidated order.
    pub side: Side,
    /// Liquidated quantity.
    pub quantity: Decimal,
    /// Liquidation price.
    pub price: Decimal,
    /// Exchange order identifier, when reported.
    pub order_id: Option<String>,
    /// Exchange-reported event time.
    pub exchange_ts: Timestamp,
    /// Local receipt time.
    pub receipt_ts: Timestamp,
}

/// Mark price / funding rate update for perpetual contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingUpdate {
    /// Source exchange.
    pub exchange: ExchangeId,
    /// Canonical instrument.
    pub symbol: Symbol,
    /// Current mark price.
    pub mark_price: Decimal,
    /// Current funding rate.
    pub rate: Decimal,
    /// Time of the next funding settlement.
    pub next_funding_ts: Timestamp,
    /// Exchange-reported event time.
    pub exchange_ts: Timestamp,
    /// Local receipt time.
    pub receipt_ts: Timestamp,
}

/// The canonical event stream delivered to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Individual trade.
    Trade(Trade),
    /// Best bid/ask quote.
    Ticker(Ticker),
    /// Forced liquidation.
    Liquidation(Liquidation),
    /// Funding rate update.
    Funding(FundingUpdate),
    /// Incremental book change.
    BookDelta(BookDelta),
    /// Full book state.
    BookSnapshot(BookSnapshot),
}

impl MarketEvent {
    /// The canonical symbol this event refers to.
    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketEvent::Trade(e) => &e.symbol,
            MarketEvent::Ticker(e) => &e.symbol,
            MarketEvent::Liquidation(e) => &e.symbol,
            MarketEvent::Funding(e) => &e.symbol,
            MarketEvent::BookDelta(e) => &e.symbol,
            MarketEvent::BookSnapshot(e) => &e.symbol,
        }
    }

    /// The exchange this event originated from.
    pub fn exchange(&self) -> ExchangeId {
        match self {
            MarketEvent::Trade(e) => e.exchange,
            MarketEvent::Ticker(e) => e.exchange,
            MarketEvent::Liquidation(e) => e.exchange,
            MarketEvent::Funding(e) => e.exchange,
            MarketEvent::BookDelta(e) => e.exchange,
            MarketEvent::BookSnapshot(e) => e.exchange,
        }
    }
}
