//! WebSocket transport collaborator.
//!
//! [`WsSession`] owns one persistent connection: it dials the shard
//! address, applies exponential backoff with jitter on reconnect, answers
//! protocol pings, and hands every text frame — stamped with its receipt
//! time — to a [`FrameHandler`]. The engine core never manages the
//! connection itself; it only reacts to the handler callbacks.
//!
//! Cancelling the session token aborts the session immediately, including
//! any fetch the handler is awaiting inside `on_frame`; a late snapshot
//! response can therefore never mutate state after its connection is gone.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use cf_core::types::Timestamp;

/// Sink half of a WebSocket connection, used to send subscribe frames.
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connection state events emitted by [`WsSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Successfully connected to the remote endpoint.
    Connected,
    /// Disconnected from the remote endpoint.
    Disconnected {
        /// Human-readable reason for disconnection.
        reason: String,
    },
    /// Attempting to reconnect.
    Reconnecting {
        /// Current reconnection attempt number (1-based).
        attempt: u32,
    },
    /// Reconnection has permanently failed.
    Failed {
        /// Human-readable reason for failure.
        reason: String,
    },
}

/// Reconnection behavior of one session.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial backoff duration before the first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration (backoff is capped at this value).
    pub max_backoff: Duration,
    /// Maximum reconnection attempts before `Failed` (0 = unlimited).
    pub max_retries: u32,
    /// Emit a warning log after this many consecutive failures.
    pub alert_after: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(1_000),
            max_backoff: Duration::from_secs(30),
            max_retries: 0, // unlimited
            alert_after: 5,
        }
    }
}

impl From<&cf_core::config::ReconnectConfig> for ReconnectPolicy {
    fn from(cfg: &cf_core::config::ReconnectConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            max_retries: cfg.max_retries,
            alert_after: 5,
        }
    }
}

/// Callbacks a connection owner implements.
///
/// `on_connect` fires after every (re)connect, before any frames, and is
/// where subscriptions are sent and local state reset. `on_frame` receives
/// every text frame with its receipt timestamp. Handler errors are
/// non-fatal for the connection.
#[async_trait::async_trait]
pub trait FrameHandler: Send + 'static {
    /// Called after a connection is established. Use to (re)subscribe.
    async fn on_connect(&mut self, sink: &mut WsSink) -> anyhow::Result<()>;

    /// Called for each received text frame.
    async fn on_frame(&mut self, text: String, receipt_ts: Timestamp) -> anyhow::Result<()>;

    /// Called on connection state changes.
    fn on_state_change(&mut self, state: ConnectionState);
}

/// Managed WebSocket session with automatic reconnection.
pub struct WsSession {
    address: String,
    policy: ReconnectPolicy,
}

impl WsSession {
    /// Create a session for one shard address.
    pub fn new(address: String, policy: ReconnectPolicy) -> Self {
        Self { address, policy }
    }

    /// The address this session dials.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Drive the connection until cancelled or retries are exhausted.
    ///
    /// Returns `Ok(())` on cancellation and `Err` when `max_retries` is
    /// exceeded.
    pub async fn run<H: FrameHandler>(
        &self,
        handler: &mut H,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            if attempt > 0 {
                handler.on_state_change(ConnectionState::Reconnecting { attempt });

                let backoff = backoff_with_jitter(
                    self.policy.initial_backoff,
                    self.policy.max_backoff,
                    attempt - 1,
                );
                tracing::info!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    address = %self.address,
                    "reconnecting WebSocket"
                );

                if attempt >= self.policy.alert_after {
                    tracing::warn!(
                        attempt,
                        address = %self.address,
                        "WebSocket reconnection attempts exceeded alert threshold"
                    );
                }

                if self.policy.max_retries > 0 && attempt > self.policy.max_retries {
                    let reason = format!(
                        "exceeded max retries ({}) for {}",
                        self.policy.max_retries, self.address
                    );
                    handler.on_state_change(ConnectionState::Failed {
                        reason: reason.clone(),
                    });
                    anyhow::bail!(reason);
                }

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            let ws_stream = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                connected = tokio_tungstenite::connect_async(&self.address) => {
                    match connected {
                        Ok((stream, _response)) => stream,
                        Err(e) => {
                            tracing::error!(address = %self.address, error = %e, "WebSocket connection failed");
                            handler.on_state_change(ConnectionState::Disconnected {
                                reason: format!("connection failed: {e}"),
                            });
                            attempt = attempt.saturating_add(1);
                            continue;
                        }
                    }
                }
            };

            let (mut sink, mut stream) = ws_stream.split();
            handler.on_state_change(ConnectionState::Connected);

            if let Err(e) = handler.on_connect(&mut sink).await {
                tracing::error!(address = %self.address, error = %e, "on_connect handler failed");
                handler.on_state_change(ConnectionState::Disconnected {
                    reason: format!("on_connect failed: {e}"),
                });
                attempt = attempt.saturating_add(1);
                continue;
            }

            // Frame loop. Both the read and the handler call race the
            // cancellation token, so an in-flight handler await (snapshot
            // bootstrap) is dropped the moment the session is cancelled.
            let disconnect_reason = loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(Message::Text(text))) => {
                        let receipt_ts = Timestamp::now();
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            result = handler.on_frame(text, receipt_ts) => {
                                if let Err(e) = result {
                                    tracing::error!(
                                        address = %self.address,
                                        error = %e,
                                        "frame handler error"
                                    );
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            break format!("failed to answer ping: {e}");
                        }
                        tracing::trace!("answered ping with pong");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::warn!(frame = ?frame, "WebSocket close frame received");
                        break "closed by server".to_string();
                    }
                    Some(Ok(_)) => {
                        // Pong / binary / raw frames carry no feed data.
                        tracing::trace!("ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        tracing::error!(address = %self.address, error = %e, "WebSocket read error");
                        break format!("read error: {e}");
                    }
                    None => break "stream ended".to_string(),
                }
            };

            handler.on_state_change(ConnectionState::Disconnected {
                reason: disconnect_reason,
            });
            attempt = 1;
        }
    }
}

/// Exponential backoff with jitter: `initial * 2^attempt` capped at `max`,
/// plus a random 0–50% of the base.
pub(crate) fn backoff_with_jitter(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let base = initial.saturating_mul(2u32.saturating_pow(attempt)).min(max);
    let jitter_frac = rand::random::<f64>() * 0.5;
    let jitter = Duration::from_secs_f64(base.as_secs_f64() * jitter_frac);
    base + jitter
}
