//! Partitioning of subscription sets across connections.
//!
//! Venues cap how many streams one connection may carry (Binance: 200 per
//! combined-stream URL). The sharder greedily packs (channel, symbol)
//! entries into connection targets, each with a fully-formed address.
//! Venues that subscribe via control messages after connecting use a fixed
//! endpoint for every shard instead of encoding streams into the URL.

use cf_core::types::{Channel, Symbol};

use crate::error::ShardError;

/// How a venue consumes subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// The subscription set is encoded into the connection URL.
    UrlEncoded,
    /// Fixed endpoint; subscriptions are sent as control messages after
    /// connecting.
    ControlMessage,
}

/// One (channel, symbol) subscription entry with its exchange-native names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamEntry {
    /// Canonical channel.
    pub channel: Channel,
    /// Venue-native channel name (e.g., `depth@100ms`, `level2`).
    pub native_channel: String,
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Venue-native symbol name (e.g., `btcusdt`, `BTCUSDTPERP`).
    pub native_symbol: String,
}

/// Template for building shard connection addresses.
#[derive(Debug, Clone)]
pub struct AddressTemplate {
    /// Subscription mode of the venue.
    pub mode: SubscriptionMode,
    /// Base websocket address. `UrlEncoded` mode appends stream tokens.
    pub base: String,
    /// Renders one entry as a URL stream token (`UrlEncoded` mode only).
    pub render: fn(&StreamEntry) -> String,
}

/// One connection's assigned slice of the subscription set.
#[derive(Debug, Clone)]
pub struct SubscriptionTarget {
    /// Shard index, unique within one sharding call.
    pub shard: usize,
    /// Fully-formed connection address.
    pub address: String,
    /// Entries assigned to this connection.
    pub entries: Vec<StreamEntry>,
}

/// Partition `entries` into connection targets of at most `capacity` each.
///
/// Guarantees: every entry appears in exactly one target; target count is
/// `ceil(entries.len() / capacity)`. An empty entry set yields no targets
/// (no connection needed). Pure — no side effects.
pub fn shard(
    entries: &[StreamEntry],
    capacity: usize,
    template: &AddressTemplate,
) -> Result<Vec<SubscriptionTarget>, ShardError> {
    if capacity == 0 {
        return Err(ShardError::ZeroCapacity);
    }
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let targets = entries
        .chunks(capacity)
        .enumerate()
        .map(|(shard, chunk)| SubscriptionTarget {
            shard,
            address: build_address(template, chunk),
            entries: chunk.to_vec(),
        })
        .collect();

    Ok(targets)
}

/// Build one shard's connection address.
fn build_address(template: &AddressTemplate, entries: &[StreamEntry]) -> String {
    match template.mode {
        SubscriptionMode::ControlMessage => template.base.clone(),
        SubscriptionMode::UrlEncoded => {
            let tokens: Vec<String> = entries.iter().map(template.render).collect();
            format!("{}{}", template.base, tokens.join("/"))
        }
    }
}
