//! Per-venue configuration profiles.
//!
//! Each venue is an instance of the same generic engine, described by an
//! [`ExchangeProfile`]: address template, sequence consistency policy,
//! timestamp unit, snapshot endpoints, and the prioritized shape-matcher
//! table. Adding a venue means writing a new profile, not a new engine.

pub mod binance;
pub mod poloniex;

use cf_core::types::{Channel, ExchangeId, TimeUnit};

use crate::lifecycle::{SubscribeFrameFn, SubscriptionLifecycle};
use crate::normalize::ShapeMatcher;
use crate::shard::{AddressTemplate, StreamEntry, SubscriptionMode};
use crate::snapshot::{resolve_depth, ParseSnapshotFn, SnapshotUrlFn};
use crate::sync::SequencePolicy;

/// Everything venue-specific the engine needs, as one configuration value.
#[derive(Clone, Copy)]
pub struct ExchangeProfile {
    /// Venue identifier.
    pub exchange: ExchangeId,
    /// Sequence consistency policy for book updates.
    pub policy: SequencePolicy,
    /// Default unit of exchange-reported event times.
    pub time_unit: TimeUnit,
    /// How this venue consumes subscriptions.
    pub mode: SubscriptionMode,
    /// Snapshot depths the venue's REST endpoint accepts.
    pub valid_depths: &'static [u32],
    /// Path appended to the WebSocket base for shard addresses
    /// (empty for fixed-endpoint venues).
    pub ws_path: &'static str,
    /// Venue-native channel name, or `None` when unsupported.
    pub channel_name: fn(Channel) -> Option<&'static str>,
    /// Renders one entry as a URL stream token (`UrlEncoded` venues).
    pub render_stream: fn(&StreamEntry) -> String,
    /// Builds one control subscribe frame (`ControlMessage` venues).
    pub subscribe_frame: Option<SubscribeFrameFn>,
    /// Builds the venue's prioritized matcher table.
    pub matchers: fn() -> Vec<ShapeMatcher>,
    /// Builds the snapshot URL for `(rest_base, native_symbol, depth)`.
    pub snapshot_url: SnapshotUrlFn,
    /// Parses a snapshot response body.
    pub parse_snapshot: ParseSnapshotFn,
}

impl ExchangeProfile {
    /// Address template for sharding against the configured base URL.
    pub fn address_template(&self, ws_base: &str) -> AddressTemplate {
        AddressTemplate {
            mode: self.mode,
            base: format!("{}{}", ws_base, self.ws_path),
            render: self.render_stream,
        }
    }

    /// Subscription lifecycle matching this venue's mode.
    pub fn lifecycle(&self) -> SubscriptionLifecycle {
        match (self.mode, self.subscribe_frame) {
            (SubscriptionMode::ControlMessage, Some(build)) => {
                SubscriptionLifecycle::control_message(build)
            }
            _ => SubscriptionLifecycle::url_encoded(),
        }
    }

    /// Round a requested snapshot depth to one the venue accepts.
    pub fn snapshot_depth(&self, requested: u32) -> u32 {
        resolve_depth(requested, self.valid_depths)
    }
}
