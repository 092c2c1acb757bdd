//! Canonical types for the crossfeed market-data engine.
//!
//! Everything downstream of the per-exchange decoders speaks these types:
//! exact-decimal prices and sizes, nanosecond timestamps, and one event
//! enum covering every channel.

pub mod events;
pub mod ids;
pub mod timestamp;

// Re-export primary types for convenient access via `cf_core::types::*`.
pub use events::{
    BookDelta, BookSnapshot, FundingUpdate, Liquidation, MarketEvent, PriceLevel, Ticker, Trade,
};
pub use ids::{Channel, ExchangeId, Side, Symbol};
pub use timestamp::{TimeUnit, Timestamp};
