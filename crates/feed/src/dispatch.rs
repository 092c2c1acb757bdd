//! Fan-out of canonical events to registered consumers.
//!
//! Delivery is non-blocking: consumers hang off unbounded crossbeam
//! channels and the feed tasks never wait on a slow reader. Consumers
//! receive owned event values, never references into live book state.
//! Receivers that have been dropped are pruned on the next delivery.

use std::sync::{Arc, Mutex};

use crossbeam::channel::{unbounded, Receiver, Sender};

use cf_core::types::MarketEvent;

/// Shared dispatcher handed to every connection of a feed.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    sinks: Arc<Mutex<Vec<Sender<MarketEvent>>>>,
}

impl EventDispatcher {
    /// Create a dispatcher with no consumers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new consumer and return its receiving end.
    pub fn subscribe(&self) -> Receiver<MarketEvent> {
        let (tx, rx) = unbounded();
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Deliver one event to every live consumer.
    ///
    /// Consumers whose receiving end has been dropped are removed.
    pub fn deliver(&self, event: MarketEvent) {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        sinks.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of currently registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
