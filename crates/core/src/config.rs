//! Layered configuration for the crossfeed engine.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults (public production endpoints)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `CROSSFEED_`, nested with `__`)
//!
//! The feeds consume only public market data, so no credentials are ever
//! read or stored here.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::types::Channel;

// ── Default value functions ────────────────────────────────────────────

/// Default request timeout: 5 000 ms.
fn default_timeout_ms() -> u64 {
    5_000
}

/// Default snapshot depth: 1 000 levels.
fn default_max_depth() -> u32 {
    1_000
}

/// Default per-connection subscription capacity: 200 streams.
fn default_stream_capacity() -> usize {
    200
}

/// Default initial reconnect backoff: 1 000 ms.
fn default_initial_backoff_ms() -> u64 {
    1_000
}

/// Default maximum reconnect backoff: 30 000 ms.
fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Default maximum reconnect retries: 0 (unlimited).
fn default_max_retries() -> u32 {
    0
}

// ── Configuration structs ──────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Binance endpoints and limits.
    pub binance: VenueConfig,
    /// Poloniex Futures endpoints and limits.
    pub poloniex: VenueConfig,
    /// Subscription set and reconnect policy shared by all feeds.
    pub feed: FeedConfig,
}

/// Per-venue connection endpoints and limits.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// WebSocket base URL.
    pub ws_url: String,
    /// REST API base URL (snapshot fetches).
    pub rest_url: String,
    /// Snapshot depth to request. Rounded up to the venue's nearest valid
    /// depth if the venue does not support this exact value.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Maximum (channel, symbol) pairs per connection. Subscription sets
    /// larger than this are sharded across connections.
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Subscription set and reconnect policy.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Canonical symbols to subscribe to (e.g., `["BTC-USDT", "ETH-USDT"]`).
    pub symbols: Vec<String>,
    /// Channels to subscribe to on every venue that supports them.
    pub channels: Vec<Channel>,
    /// Reconnect parameters.
    pub reconnect: ReconnectConfig,
}

/// WebSocket reconnect parameters with exponential backoff.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Maximum consecutive reconnect attempts before giving up (0 = unlimited).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults (public production endpoints).
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment variable overrides with prefix `CROSSFEED_` and `__`
    ///    as the nesting separator (e.g., `CROSSFEED_BINANCE__MAX_DEPTH=500`).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            .set_default("binance.ws_url", "wss://stream.binance.com:9443")?
            .set_default("binance.rest_url", "https://api.binance.com")?
            .set_default("binance.max_depth", 1000i64)?
            .set_default("binance.stream_capacity", 200i64)?
            .set_default("binance.timeout_ms", 5000i64)?
            .set_default("poloniex.ws_url", "wss://futures-apiws.poloniex.com")?
            .set_default("poloniex.rest_url", "https://futures-api.poloniex.com")?
            .set_default("poloniex.max_depth", 100i64)?
            .set_default("poloniex.stream_capacity", 100i64)?
            .set_default("poloniex.timeout_ms", 5000i64)?
            .set_default("feed.symbols", vec!["BTC-USDT"])?
            .set_default("feed.channels", vec!["l2_book", "trades"])?
            .set_default("feed.reconnect.initial_backoff_ms", 1000i64)?
            .set_default("feed.reconnect.max_backoff_ms", 30000i64)?
            .set_default("feed.reconnect.max_retries", 0i64)?;

        // ── Layer 2: TOML file ─────────────────────────────────────
        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (CROSSFEED_ prefix) ─────────
        // The prefix separator must be set explicitly to `_` because the
        // `config` crate defaults it to the nesting separator when one is
        // provided; without this, `CROSSFEED_BINANCE__MAX_DEPTH` would be
        // matched against prefix `crossfeed__` instead of `crossfeed_`.
        builder = builder.add_source(
            Environment::with_prefix("CROSSFEED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate configuration invariants.
    fn validate(&self) -> Result<()> {
        for (name, venue) in [("binance", &self.binance), ("poloniex", &self.poloniex)] {
            if venue.stream_capacity == 0 {
                bail!("{name}.stream_capacity must be greater than zero");
            }
            if venue.max_depth == 0 {
                bail!("{name}.max_depth must be greater than zero");
            }
        }
        if self.feed.symbols.is_empty() {
            bail!("feed.symbols must not be empty");
        }
        if self.feed.channels.is_empty() {
            bail!("feed.channels must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Global mutex to serialize tests that manipulate environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        std::env::remove_var("CROSSFEED_BINANCE__MAX_DEPTH");
        std::env::remove_var("CROSSFEED_POLONIEX__STREAM_CAPACITY");
    }

    /// Helper: create a temporary TOML config file and return its path.
    fn write_temp_toml(content: &str) -> (tempfile::NamedTempFile, PathBuf) {
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        write!(f, "{}", content).expect("write temp file");
        let path = f.path().to_path_buf();
        (f, path)
    }

    #[test]
    fn test_load_defaults_only() {
        let _lock = lock_env();
        clear_env();

        let cfg = AppConfig::load(None).expect("load defaults");
        assert_eq!(cfg.binance.ws_url, "wss://stream.binance.com:9443");
        assert_eq!(cfg.binance.stream_capacity, 200);
        assert_eq!(cfg.binance.max_depth, 1000);
        assert_eq!(cfg.poloniex.rest_url, "https://futures-api.poloniex.com");
        assert_eq!(cfg.poloniex.max_depth, 100);
        assert_eq!(cfg.feed.symbols, vec!["BTC-USDT"]);
        assert_eq!(cfg.feed.channels, vec![Channel::L2Book, Channel::Trades]);
        assert_eq!(cfg.feed.reconnect.max_retries, 0);
    }

    #[test]
    fn test_load_from_toml() {
        let _lock = lock_env();
        clear_env();

        let toml_content = r#"
[binance]
ws_url = "wss://testnet.binance.vision"
rest_url = "https://testnet.binance.vision"
max_depth = 500
stream_capacity = 50

[feed]
symbols = ["BTC-USDT", "ETH-USDT"]
channels = ["l2_book", "trades", "funding"]

[feed.reconnect]
initial_backoff_ms = 500
max_retries = 20
"#;
        let (_f, path) = write_temp_toml(toml_content);
        let cfg = AppConfig::load(Some(path)).expect("load from toml");

        assert_eq!(cfg.binance.ws_url, "wss://testnet.binance.vision");
        assert_eq!(cfg.binance.max_depth, 500);
        assert_eq!(cfg.binance.stream_capacity, 50);
        assert_eq!(cfg.feed.symbols, vec!["BTC-USDT", "ETH-USDT"]);
        assert_eq!(
            cfg.feed.channels,
            vec![Channel::L2Book, Channel::Trades, Channel::Funding]
        );
        assert_eq!(cfg.feed.reconnect.initial_backoff_ms, 500);
        assert_eq!(cfg.feed.reconnect.max_retries, 20);
        // Untouched venue keeps its defaults.
        assert_eq!(cfg.poloniex.stream_capacity, 100);
    }

    #[test]
    fn test_env_var_overrides() {
        let _lock = lock_env();
        clear_env();
        std::env::set_var("CROSSFEED_BINANCE__MAX_DEPTH", "100");

        let cfg = AppConfig::load(None).expect("load with env override");
        assert_eq!(cfg.binance.max_depth, 100);

        clear_env();
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let _lock = lock_env();
        clear_env();

        let toml_content = r#"
[poloniex]
ws_url = "wss://futures-apiws.poloniex.com"
rest_url = "https://futures-api.poloniex.com"
stream_capacity = 0
"#;
        let (_f, path) = write_temp_toml(toml_content);
        let result = AppConfig::load(Some(path));
        assert!(result.is_err());
        let err_msg = format!("{}", result.unwrap_err());
        assert!(err_msg.contains("stream_capacity"), "got: {err_msg}");
    }

    #[test]
    fn test_empty_symbols_rejected() {
        let _lock = lock_env();
        clear_env();

        let toml_content = r#"
[feed]
symbols = []
"#;
        let (_f, path) = write_temp_toml(toml_content);
        let result = AppConfig::load(Some(path));
        assert!(result.is_err());
    }
}
