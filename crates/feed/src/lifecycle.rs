//! Subscription lifecycle across connect and reconnect.
//!
//! Venues subscribe in one of two ways: the subscription set is already
//! encoded in the connection URL (nothing to send on connect), or the
//! endpoint is fixed and one control frame per (channel, symbol) entry is
//! sent after connecting. In both cases a reconnect forces a full state
//! reset — sequence continuity never survives a connection change — and
//! subscription failures surface to the transport collaborator rather
//! than being retried here.

use crate::shard::{StreamEntry, SubscriptionMode, SubscriptionTarget};
use crate::sync::OrderBookSynchronizer;

/// Builds one control-message subscribe frame for an entry.
pub type SubscribeFrameFn = fn(&StreamEntry, u64) -> String;

/// Per-connection subscription state machine.
pub struct SubscriptionLifecycle {
    mode: SubscriptionMode,
    build_frame: Option<SubscribeFrameFn>,
    next_request_id: u64,
}

impl SubscriptionLifecycle {
    /// Lifecycle for a venue whose subscriptions are URL-encoded.
    pub fn url_encoded() -> Self {
        Self {
            mode: SubscriptionMode::UrlEncoded,
            build_frame: None,
            next_request_id: 1,
        }
    }

    /// Lifecycle for a venue subscribed via post-connect control messages.
    pub fn control_message(build_frame: SubscribeFrameFn) -> Self {
        Self {
            mode: SubscriptionMode::ControlMessage,
            build_frame: Some(build_frame),
            next_request_id: 1,
        }
    }

    /// The venue's subscription mode.
    pub fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    /// Frames to send after (re)connecting to `target`.
    ///
    /// Empty for URL-encoded venues — connecting to the shard address is
    /// the subscription. Control-message venues get one frame per entry
    /// with a fresh request identifier.
    pub fn subscribe_frames(&mut self, target: &SubscriptionTarget) -> Vec<String> {
        let Some(build_frame) = self.build_frame else {
            return Vec::new();
        };

        target
            .entries
            .iter()
            .map(|entry| {
                let id = self.next_request_id;
                self.next_request_id += 1;
                build_frame(entry, id)
            })
            .collect()
    }

    /// React to a reconnect of this connection.
    ///
    /// Destroys every book the connection owns; the next delta per symbol
    /// triggers a fresh snapshot bootstrap.
    pub fn on_reconnect(&self, sync: &mut OrderBookSynchronizer) {
        tracing::info!("connection re-established, resetting all book state");
        sync.reset(None);
    }
}
