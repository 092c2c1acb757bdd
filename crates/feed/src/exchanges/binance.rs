//! Binance profile: wire types, decode table, and endpoints.
//!
//! Binance multiplexes subscriptions into combined-stream URLs
//! (`/stream?streams=btcusdt@depth@100ms/...`) with a 200-stream limit per
//! connection, so subscription sets shard across connections. Every frame
//! arrives wrapped in a `{"stream": ..., "data": {...}}` envelope; the
//! payload carries an `"e"` event tag except for quote updates, which are
//! recognized by key-shape. Book updates carry a first/last identifier
//! pair and use the window consistency policy.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use cf_core::types::{
    Channel, ExchangeId, FundingUpdate, Liquidation, Ticker, TimeUnit, Timestamp, Trade,
};

use crate::error::{NormalizeError, SnapshotError};
use crate::normalize::{
    get, parse_decimal, side_from_maker_flag, side_from_text, RawBookUpdate, ShapeMatcher,
    WireEvent, WireNormalizer,
};
use crate::shard::{StreamEntry, SubscriptionMode};
use crate::sync::{RawSnapshot, SequencePolicy};

use super::ExchangeProfile;

/// Snapshot depths accepted by `/api/v3/depth`.
pub const VALID_DEPTHS: &[u32] = &[5, 10, 20, 50, 100, 500, 1000, 5000];

/// The Binance venue profile.
pub fn profile() -> ExchangeProfile {
    ExchangeProfile {
        exchange: ExchangeId::Binance,
        policy: SequencePolicy::Window,
        time_unit: TimeUnit::Millis,
        mode: SubscriptionMode::UrlEncoded,
        valid_depths: VALID_DEPTHS,
        ws_path: "/stream?streams=",
        channel_name,
        render_stream,
        subscribe_frame: None,
        matchers,
        snapshot_url,
        parse_snapshot,
    }
}

/// Venue-native stream name per canonical channel.
fn channel_name(channel: Channel) -> Option<&'static str> {
    match channel {
        Channel::L2Book => Some("depth@100ms"),
        Channel::Trades => Some("aggTrade"),
        Channel::Ticker => Some("bookTicker"),
        Channel::Liquidations => Some("forceOrder"),
        Channel::Funding => Some("markPrice"),
    }
}

/// Combined-stream token: `btcusdt@depth@100ms`.
fn render_stream(entry: &StreamEntry) -> String {
    format!(
        "{}@{}",
        entry.native_symbol.to_lowercase(),
        entry.native_channel
    )
}

/// GET `/api/v3/depth?symbol={SYMBOL}&limit={depth}`.
fn snapshot_url(rest_base: &str, native_symbol: &str, depth: u32) -> String {
    format!(
        "{}/api/v3/depth?symbol={}&limit={}",
        rest_base,
        native_symbol.to_uppercase(),
        depth
    )
}

// ── Wire types ─────────────────────────────────────────────────────────

/// Raw depth update from the `@depth@100ms` stream.
#[derive(Debug, Deserialize)]
pub struct BinanceDepthUpdate {
    /// Event type (always `"depthUpdate"`).
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time (milliseconds since epoch).
    #[serde(rename = "E")]
    pub event_time: u64,
    /// Symbol (uppercase, e.g., `"BTCUSDT"`).
    #[serde(rename = "s")]
    pub symbol: String,
    /// First update ID in event.
    #[serde(rename = "U")]
    pub first_update_id: u64,
    /// Final update ID in event.
    #[serde(rename = "u")]
    pub last_update_id: u64,
    /// Bid levels as `[price, quantity]` string pairs.
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    /// Ask levels as `[price, quantity]` string pairs.
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
}

/// Raw aggregate trade from the `@aggTrade` stream.
#[derive(Debug, Deserialize)]
pub struct BinanceAggTrade {
    /// Event type (always `"aggTrade"`).
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time (milliseconds since epoch).
    #[serde(rename = "E")]
    pub event_time: u64,
    /// Symbol (uppercase).
    #[serde(rename = "s")]
    pub symbol: String,
    /// Aggregate trade ID.
    #[serde(rename = "a")]
    pub trade_id: u64,
    /// Price as a decimal string.
    #[serde(rename = "p")]
    pub price: String,
    /// Quantity as a decimal string.
    #[serde(rename = "q")]
    pub quantity: String,
    /// `true` if the buyer is the market maker (the trade was a sell).
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Raw quote update from the `@bookTicker` stream.
///
/// Carries no `"e"` event tag on spot; the futures variants add an `"E"`
/// event time, so it is optional here.
#[derive(Debug, Deserialize)]
pub struct BinanceBookTicker {
    /// Book update ID.
    #[serde(rename = "u")]
    pub update_id: u64,
    /// Symbol (uppercase).
    #[serde(rename = "s")]
    pub symbol: String,
    /// Best bid price.
    #[serde(rename = "b")]
    pub bid_price: String,
    /// Best bid quantity.
    #[serde(rename = "B")]
    pub bid_qty: String,
    /// Best ask price.
    #[serde(rename = "a")]
    pub ask_price: String,
    /// Best ask quantity.
    #[serde(rename = "A")]
    pub ask_qty: String,
    /// Event time (futures only).
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
}

/// Raw liquidation from the `@forceOrder` stream.
#[derive(Debug, Deserialize)]
pub struct BinanceForceOrder {
    /// Event type (always `"forceOrder"`).
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time (milliseconds since epoch).
    #[serde(rename = "E")]
    pub event_time: u64,
    /// The liquidated order.
    #[serde(rename = "o")]
    pub order: BinanceForceOrderDetail,
}

/// Order details nested inside a `forceOrder` event.
#[derive(Debug, Deserialize)]
pub struct BinanceForceOrderDetail {
    /// Symbol (uppercase).
    #[serde(rename = "s")]
    pub symbol: String,
    /// Side as `"BUY"` / `"SELL"`.
    #[serde(rename = "S")]
    pub side: String,
    /// Original quantity as a decimal string.
    #[serde(rename = "q")]
    pub quantity: String,
    /// Price as a decimal string.
    #[serde(rename = "p")]
    pub price: String,
}

/// Raw funding update from the `@markPrice` stream.
#[derive(Debug, Deserialize)]
pub struct BinanceMarkPrice {
    /// Event type (always `"markPriceUpdate"`).
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time (milliseconds since epoch).
    #[serde(rename = "E")]
    pub event_time: u64,
    /// Symbol (uppercase).
    #[serde(rename = "s")]
    pub symbol: String,
    /// Mark price as a decimal string.
    #[serde(rename = "p")]
    pub mark_price: String,
    /// Funding rate as a decimal string.
    #[serde(rename = "r")]
    pub funding_rate: String,
    /// Next funding time (milliseconds since epoch).
    #[serde(rename = "T")]
    pub next_funding_time: u64,
}

/// REST response for `/api/v3/depth`.
#[derive(Debug, Deserialize)]
pub struct BinanceDepthSnapshot {
    /// Last update ID included in the snapshot.
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    /// Bid levels as `[price, quantity]` string pairs.
    pub bids: Vec<[String; 2]>,
    /// Ask levels as `[price, quantity]` string pairs.
    pub asks: Vec<[String; 2]>,
}

/// Parse `[price, quantity]` string pairs into exact decimals.
fn parse_levels(levels: &[[String; 2]]) -> Result<Vec<(Decimal, Decimal)>, NormalizeError> {
    levels
        .iter()
        .map(|[price, size]| {
            Ok((
                parse_decimal(price, "price")?,
                parse_decimal(size, "size")?,
            ))
        })
        .collect()
}

// ── Matcher table ──────────────────────────────────────────────────────

/// Event tag of the combined-stream payload, when present.
fn data_event(v: &Value) -> Option<&str> {
    v.get("data")?.get("e")?.as_str()
}

/// The prioritized matcher table for combined-stream frames.
pub fn matchers() -> Vec<ShapeMatcher> {
    vec![
        ShapeMatcher {
            name: "depth_update",
            claims: |v| data_event(v) == Some("depthUpdate"),
            decode: decode_depth,
        },
        ShapeMatcher {
            name: "agg_trade",
            claims: |v| data_event(v) == Some("aggTrade"),
            decode: decode_trade,
        },
        ShapeMatcher {
            name: "force_order",
            claims: |v| data_event(v) == Some("forceOrder"),
            decode: decode_liquidation,
        },
        ShapeMatcher {
            name: "mark_price",
            claims: |v| data_event(v) == Some("markPriceUpdate"),
            decode: decode_funding,
        },
        // Quote updates carry no event tag; the best-ask-quantity key
        // disambiguates them from everything else.
        ShapeMatcher {
            name: "book_ticker",
            claims: |v| {
                matches!(v.get("data"),
                    Some(data) if data.get("e").is_none() && data.get("A").is_some())
            },
            decode: decode_ticker,
        },
    ]
}

fn decode_depth(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let raw: BinanceDepthUpdate = serde_json::from_value(get(v, "data")?.clone())?;
    let symbol = n.canonical_symbol(&raw.symbol)?;

    Ok(WireEvent::Book(RawBookUpdate {
        symbol,
        native_symbol: raw.symbol,
        first_sequence: raw.first_update_id,
        last_sequence: raw.last_update_id,
        exchange_ts: Some(n.event_time(raw.event_time)),
        receipt_ts,
        bids: parse_levels(&raw.bids)?,
        asks: parse_levels(&raw.asks)?,
    }))
}

fn decode_trade(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let raw: BinanceAggTrade = serde_json::from_value(get(v, "data")?.clone())?;
    let symbol = n.canonical_symbol(&raw.symbol)?;

    Ok(WireEvent::Trade(Trade {
        exchange: n.exchange(),
        symbol,
        trade_id: raw.trade_id.to_string(),
        side: side_from_maker_flag(raw.is_buyer_maker),
        amount: parse_decimal(&raw.quantity, "q")?,
        price: parse_decimal(&raw.price, "p")?,
        exchange_ts: n.event_time(raw.event_time),
        receipt_ts,
    }))
}

fn decode_ticker(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let raw: BinanceBookTicker = serde_json::from_value(get(v, "data")?.clone())?;
    let symbol = n.canonical_symbol(&raw.symbol)?;

    Ok(WireEvent::Ticker(Ticker {
        exchange: n.exchange(),
        symbol,
        bid: parse_decimal(&raw.bid_price, "b")?,
        ask: parse_decimal(&raw.ask_price, "a")?,
        exchange_ts: raw.event_time.map(|t| n.event_time(t)),
        receipt_ts,
    }))
}

fn decode_liquidation(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let raw: BinanceForceOrder = serde_json::from_value(get(v, "data")?.clone())?;
    let symbol = n.canonical_symbol(&raw.order.symbol)?;

    Ok(WireEvent::Liquidation(Liquidation {
        exchange: n.exchange(),
        symbol,
        side: side_from_text(&raw.order.side, "S")?,
        quantity: parse_decimal(&raw.order.quantity, "q")?,
        price: parse_decimal(&raw.order.price, "p")?,
        order_id: None,
        exchange_ts: n.event_time(raw.event_time),
        receipt_ts,
    }))
}

fn decode_funding(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let raw: BinanceMarkPrice = serde_json::from_value(get(v, "data")?.clone())?;
    let symbol = n.canonical_symbol(&raw.symbol)?;

    Ok(WireEvent::Funding(FundingUpdate {
        exchange: n.exchange(),
        symbol,
        mark_price: parse_decimal(&raw.mark_price, "p")?,
        rate: parse_decimal(&raw.funding_rate, "r")?,
        next_funding_ts: n.event_time(raw.next_funding_time),
        exchange_ts: n.event_time(raw.event_time),
        receipt_ts,
    }))
}

/// Parse a `/api/v3/depth` response body.
pub fn parse_snapshot(body: &str) -> Result<RawSnapshot, SnapshotError> {
    let raw: BinanceDepthSnapshot =
        serde_json::from_str(body).map_err(|e| SnapshotError::Malformed(e.to_string()))?;

    let bids = parse_levels(&raw.bids).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
    let asks = parse_levels(&raw.asks).map_err(|e| SnapshotError::Malformed(e.to_string()))?;

    Ok(RawSnapshot {
        sequence: raw.last_update_id,
        bids,
        asks,
        exchange_ts: None,
    })
}
