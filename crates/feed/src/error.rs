//! Error taxonomy for the feed engine.
//!
//! Every failure here is local to one symbol's synchronization state or one
//! message's decoding; nothing terminates the process. Gaps are not errors
//! at all — they are handled inside the synchronizer by destroying and
//! re-bootstrapping the affected book.

use cf_core::types::Symbol;

/// Errors from the address sharder.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// Per-connection capacity must be a positive number of streams.
    #[error("shard capacity must be greater than zero")]
    ZeroCapacity,
}

/// Errors produced while decoding a raw frame.
///
/// These are logged at warning level and the frame is dropped; decoding
/// failures never affect synchronization state.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A field is present but has an unexpected shape or value.
    #[error("field `{field}` has unexpected value: {detail}")]
    BadField {
        /// The offending field.
        field: &'static str,
        /// What was found.
        detail: String,
    },
    /// The exchange-native symbol is not registered with the codec.
    #[error("unknown exchange symbol `{0}`")]
    UnknownSymbol(String),
}

/// Errors from a snapshot fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The HTTP round trip failed.
    #[error("snapshot request failed: {0}")]
    Transport(#[source] anyhow::Error),
    /// The response arrived but could not be decoded into a snapshot.
    /// Treated identically to a transport failure by the synchronizer.
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

/// Errors surfaced by the order book synchronizer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Snapshot bootstrap failed; the symbol stays unsynced and the next
    /// delta for it will retry.
    #[error("snapshot bootstrap failed for {symbol}")]
    SnapshotFetch {
        /// The symbol whose bootstrap failed.
        symbol: Symbol,
        /// The underlying fetch failure.
        #[source]
        source: SnapshotError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShardError::ZeroCapacity;
        assert_eq!(err.to_string(), "shard capacity must be greater than zero");

        let err = NormalizeError::MissingField("seq");
        assert_eq!(err.to_string(), "missing field `seq`");

        let err = NormalizeError::UnknownSymbol("XYZUSDT".to_string());
        assert!(err.to_string().contains("XYZUSDT"));
    }

    #[test]
    fn test_sync_error_carries_source() {
        use std::error::Error;

        let err = SyncError::SnapshotFetch {
            symbol: Symbol::new("BTC-USDT"),
            source: SnapshotError::Malformed("bids missing".to_string()),
        };
        assert!(err.to_string().contains("BTC-USDT"));
        let source = err.source().expect("has source");
        assert!(source.to_string().contains("bids missing"));
    }
}
