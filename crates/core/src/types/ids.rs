//! Identifier types: exchanges, canonical symbols, sides, and channels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeId {
    /// Binance spot and futures.
    Binance,
    /// Poloniex linear perpetual futures.
    PoloniexFutures,
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeId::Binance => write!(f, "BINANCE"),
            ExchangeId::PoloniexFutures => write!(f, "POLONIEX_FUTURES"),
        }
    }
}

/// Taker side of a trade or liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy / long.
    Buy,
    /// Sell / short.
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// Canonical instrument identifier, unique across exchanges
/// (e.g., `"BTC-USDT"`, `"BTC-USDT-PERP"`).
///
/// Produced by the symbol codec from instrument definitions; opaque to
/// everything downstream of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Create a new symbol.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The symbol as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical market-data channels a feed can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Full-depth order book (snapshot + incremental deltas).
    L2Book,
    /// Individual trades.
    Trades,
    /// Best bid/ask quotes.
    Ticker,
    /// Forced liquidation orders.
    Liquidations,
    /// Mark price and funding rate updates.
    Funding,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::L2Book => write!(f, "l2_book"),
            Channel::Trades => write!(f, "trades"),
            Channel::Ticker => write!(f, "ticker"),
            Channel::Liquidations => write!(f, "liquidations"),
            Channel::Funding => write!(f, "funding"),
        }
    }
}
