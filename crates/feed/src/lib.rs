//! # cf-feed
//!
//! Exchange feed engine: ingests per-venue WebSocket streams, reconstructs
//! sequence-consistent order books from REST snapshots plus incremental
//! deltas, normalizes heterogeneous wire formats into the canonical
//! [`cf_core::types`] schema, and shards large subscription sets across
//! connections. Venues are configuration profiles over one generic engine.

pub mod book;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod exchanges;
pub mod lifecycle;
pub mod normalize;
pub mod shard;
pub mod snapshot;
pub mod symbols;
pub mod sync;
pub mod transport;

pub use dispatch::EventDispatcher;
pub use engine::ExchangeFeed;
pub use exchanges::ExchangeProfile;
