//! REST snapshot fetcher implementing the [`SnapshotFetcher`] seam.
//!
//! URL construction and body parsing are venue-specific and supplied by
//! the exchange profile; the HTTP round trip itself is shared. Fetch
//! failures are fatal only to the current bootstrap attempt — the
//! synchronizer leaves the symbol unsynced and retries on its next delta.

use crate::error::SnapshotError;
use crate::sync::{RawSnapshot, SnapshotFetcher};

/// Builds the snapshot URL for `(rest_base, native_symbol, depth)`.
pub type SnapshotUrlFn = fn(&str, &str, u32) -> String;

/// Parses a response body into a [`RawSnapshot`].
pub type ParseSnapshotFn = fn(&str) -> Result<RawSnapshot, SnapshotError>;

/// HTTP snapshot fetcher shared by all shards of one feed.
pub struct HttpSnapshotFetcher {
    client: reqwest::Client,
    rest_base: String,
    build_url: SnapshotUrlFn,
    parse: ParseSnapshotFn,
}

impl HttpSnapshotFetcher {
    /// Create a fetcher with the given request timeout.
    pub fn new(
        rest_base: String,
        timeout_ms: u64,
        build_url: SnapshotUrlFn,
        parse: ParseSnapshotFn,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            rest_base,
            build_url,
            parse,
        })
    }
}

#[async_trait::async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self, native_symbol: &str, depth: u32) -> Result<RawSnapshot, SnapshotError> {
        let url = (self.build_url)(&self.rest_base, native_symbol, depth);
        tracing::info!(url = %url, symbol = %native_symbol, "fetching depth snapshot");

        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SnapshotError::Transport(e.into()))?
            .text()
            .await
            .map_err(|e| SnapshotError::Transport(e.into()))?;

        let snapshot = (self.parse)(&body)?;
        tracing::info!(
            symbol = %native_symbol,
            sequence = snapshot.sequence,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "depth snapshot received"
        );
        Ok(snapshot)
    }
}

/// Round a requested depth up to the venue's nearest valid depth.
///
/// Returns the request unchanged when the venue supports it, otherwise the
/// smallest valid depth above it, or the venue maximum when the request
/// exceeds every valid depth.
pub fn resolve_depth(requested: u32, valid_depths: &[u32]) -> u32 {
    if valid_depths.contains(&requested) {
        return requested;
    }
    valid_depths
        .iter()
        .copied()
        .find(|&d| d > requested)
        .or_else(|| valid_depths.last().copied())
        .unwrap_or(requested)
}
