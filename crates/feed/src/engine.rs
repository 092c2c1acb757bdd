//! Per-venue feed assembly and per-connection message processing.
//!
//! An [`ExchangeFeed`] turns one venue profile plus configuration into a
//! set of sharded connections. Each shard runs as an independent tokio
//! task owning its own normalizer, synchronizer, and book state — shards
//! cover disjoint symbol sets, so nothing is shared between them and
//! events within one connection are emitted in exact arrival order.

use std::sync::Arc;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use cf_core::config::{FeedConfig, VenueConfig};
use cf_core::types::{ExchangeId, MarketEvent, Symbol, Timestamp};

use crate::dispatch::EventDispatcher;
use crate::error::ShardError;
use crate::exchanges::ExchangeProfile;
use crate::lifecycle::SubscriptionLifecycle;
use crate::normalize::{WireEvent, WireNormalizer};
use crate::shard::{shard, StreamEntry, SubscriptionTarget};
use crate::snapshot::HttpSnapshotFetcher;
use crate::symbols::SymbolCodec;
use crate::sync::OrderBookSynchronizer;
use crate::transport::{ConnectionState, FrameHandler, ReconnectPolicy, WsSession, WsSink};

/// One venue's feed: profile + configuration + symbol table.
pub struct ExchangeFeed {
    profile: ExchangeProfile,
    venue: VenueConfig,
    reconnect: ReconnectPolicy,
    codec: SymbolCodec,
    feed: FeedConfig,
    dispatcher: EventDispatcher,
}

impl ExchangeFeed {
    /// Assemble a feed from its profile and configuration.
    pub fn new(
        profile: ExchangeProfile,
        venue: VenueConfig,
        feed: FeedConfig,
        codec: SymbolCodec,
        dispatcher: EventDispatcher,
    ) -> Self {
        let reconnect = ReconnectPolicy::from(&feed.reconnect);
        Self {
            profile,
            venue,
            reconnect,
            codec,
            feed,
            dispatcher,
        }
    }

    /// The (channel, symbol) entries this feed subscribes to.
    ///
    /// Channels the venue does not offer and symbols missing from the
    /// codec are skipped with a log line rather than failing the feed.
    pub fn subscription_entries(&self) -> Vec<StreamEntry> {
        let mut entries = Vec::new();
        for channel in self.feed.channels.iter().copied() {
            let Some(native_channel) = (self.profile.channel_name)(channel) else {
                tracing::debug!(
                    exchange = %self.profile.exchange,
                    %channel,
                    "channel not offered by venue, skipping"
                );
                continue;
            };
            for name in &self.feed.symbols {
                let symbol = Symbol::new(name.clone());
                match self.codec.native(&symbol) {
                    Some(native) => entries.push(StreamEntry {
                        channel,
                        native_channel: native_channel.to_string(),
                        symbol,
                        native_symbol: native.to_string(),
                    }),
                    None => tracing::warn!(
                        exchange = %self.profile.exchange,
                        %symbol,
                        "symbol not registered for venue, skipping"
                    ),
                }
            }
        }
        entries
    }

    /// Shard the subscription set into connection targets.
    pub fn targets(&self) -> Result<Vec<SubscriptionTarget>, ShardError> {
        let template = self.profile.address_template(&self.venue.ws_url);
        shard(
            &self.subscription_entries(),
            self.venue.stream_capacity,
            &template,
        )
    }

    /// Spawn one connection task per shard.
    ///
    /// Returns the task handles; an empty subscription set opens no
    /// connections. Cancelling the token tears every connection down,
    /// aborting any in-flight snapshot bootstrap with it.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<tokio::task::JoinHandle<()>>> {
        let targets = self.targets()?;
        if targets.is_empty() {
            tracing::info!(
                exchange = %self.profile.exchange,
                "empty subscription set, no connections opened"
            );
            return Ok(Vec::new());
        }

        let depth = self.profile.snapshot_depth(self.venue.max_depth);
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            let fetcher = Arc::new(HttpSnapshotFetcher::new(
                self.venue.rest_url.clone(),
                self.venue.timeout_ms,
                self.profile.snapshot_url,
                self.profile.parse_snapshot,
            )?);
            let sync = OrderBookSynchronizer::new(
                self.profile.exchange,
                self.profile.policy,
                depth,
                Some(depth as usize),
                fetcher,
                self.dispatcher.clone(),
            );
            let normalizer = WireNormalizer::new(
                self.profile.exchange,
                self.profile.time_unit,
                self.codec.clone(),
                (self.profile.matchers)(),
            );

            let address = target.address.clone();
            let session = WsSession::new(address, self.reconnect.clone());
            let mut connection = FeedConnection {
                exchange: self.profile.exchange,
                shard: target.shard,
                normalizer,
                sync,
                lifecycle: self.profile.lifecycle(),
                dispatcher: self.dispatcher.clone(),
                target,
            };

            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = session.run(&mut connection, cancel).await {
                    tracing::error!(
                        exchange = %connection.exchange,
                        shard = connection.shard,
                        error = %e,
                        "feed connection terminated"
                    );
                }
            }));
        }

        Ok(handles)
    }
}

/// One connection's processing state: normalizer in, synchronizer and
/// dispatcher out.
struct FeedConnection {
    exchange: ExchangeId,
    shard: usize,
    normalizer: WireNormalizer,
    sync: OrderBookSynchronizer,
    lifecycle: SubscriptionLifecycle,
    dispatcher: EventDispatcher,
    target: SubscriptionTarget,
}

#[async_trait::async_trait]
impl FrameHandler for FeedConnection {
    async fn on_connect(&mut self, sink: &mut WsSink) -> anyhow::Result<()> {
        // Sequence continuity never survives a connection change: every
        // (re)connect starts from destroyed books.
        self.lifecycle.on_reconnect(&mut self.sync);

        for frame in self.lifecycle.subscribe_frames(&self.target) {
            sink.send(Message::Text(frame)).await?;
        }

        tracing::info!(
            exchange = %self.exchange,
            shard = self.shard,
            streams = self.target.entries.len(),
            "subscription established"
        );
        Ok(())
    }

    async fn on_frame(&mut self, text: String, receipt_ts: Timestamp) -> anyhow::Result<()> {
        let Some(event) = self.normalizer.normalize(&text, receipt_ts) else {
            return Ok(());
        };

        match event {
            WireEvent::Book(update) => {
                if let Err(e) = self.sync.on_delta(update).await {
                    // Fatal to this bootstrap attempt only; the next
                    // delta for the symbol retries.
                    tracing::warn!(
                        exchange = %self.exchange,
                        error = %e,
                        "book bootstrap failed"
                    );
                }
            }
            WireEvent::Trade(trade) => self.dispatcher.deliver(MarketEvent::Trade(trade)),
            WireEvent::Ticker(ticker) => self.dispatcher.deliver(MarketEvent::Ticker(ticker)),
            WireEvent::Liquidation(liq) => {
                self.dispatcher.deliver(MarketEvent::Liquidation(liq))
            }
            WireEvent::Funding(funding) => {
                self.dispatcher.deliver(MarketEvent::Funding(funding))
            }
            WireEvent::Admin(name) => {
                tracing::trace!(exchange = %self.exchange, frame = name, "control frame");
            }
        }
        Ok(())
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        match &state {
            ConnectionState::Connected => {
                tracing::info!(exchange = %self.exchange, shard = self.shard, "connected");
            }
            ConnectionState::Disconnected { reason } => {
                tracing::warn!(
                    exchange = %self.exchange,
                    shard = self.shard,
                    reason = %reason,
                    "disconnected"
                );
            }
            ConnectionState::Reconnecting { attempt } => {
                tracing::info!(
                    exchange = %self.exchange,
                    shard = self.shard,
                    attempt,
                    "reconnecting"
                );
            }
            ConnectionState::Failed { reason } => {
                tracing::error!(
                    exchange = %self.exchange,
                    shard = self.shard,
                    reason = %reason,
                    "connection failed permanently"
                );
            }
        }
    }
}
