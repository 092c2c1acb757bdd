//! Poloniex Futures profile: wire types, decode table, and endpoints.
//!
//! Poloniex Futures uses a fixed WebSocket endpoint with per-topic control
//! subscriptions (`/contractMarket/level2:BTCUSDTPERP`). Every data frame
//! carries a `type`/`subject`/`topic` envelope; book updates change a
//! single level encoded as a `"price,side,size"` string and carry one
//! sequence number checked under the strict policy. Trade times are
//! nanoseconds while book times are milliseconds.

use rust_decimal::Decimal;
use serde_json::Value;

use cf_core::types::{Channel, ExchangeId, Side, TimeUnit, Timestamp, Trade};

use crate::error::{NormalizeError, SnapshotError};
use crate::normalize::{
    decimal_field, get, parse_decimal, side_from_text, str_field, to_decimal, u64_field,
    RawBookUpdate, ShapeMatcher, WireEvent, WireNormalizer,
};
use crate::shard::{StreamEntry, SubscriptionMode};
use crate::sync::{RawSnapshot, SequencePolicy};

use super::ExchangeProfile;

/// Snapshot depths accepted by `/api/v1/level2/depth`.
pub const VALID_DEPTHS: &[u32] = &[5, 10, 20, 30, 50, 100];

/// The Poloniex Futures venue profile.
pub fn profile() -> ExchangeProfile {
    ExchangeProfile {
        exchange: ExchangeId::PoloniexFutures,
        policy: SequencePolicy::Strict,
        time_unit: TimeUnit::Millis,
        mode: SubscriptionMode::ControlMessage,
        valid_depths: VALID_DEPTHS,
        ws_path: "",
        channel_name,
        render_stream,
        subscribe_frame: Some(subscribe_frame),
        matchers,
        snapshot_url,
        parse_snapshot,
    }
}

/// Venue-native topic name per canonical channel.
fn channel_name(channel: Channel) -> Option<&'static str> {
    match channel {
        Channel::L2Book => Some("level2"),
        Channel::Trades => Some("execution"),
        // No public quote, liquidation, or funding topics on this venue.
        _ => None,
    }
}

/// Topic token, used only for logging (subscriptions go via frames).
fn render_stream(entry: &StreamEntry) -> String {
    format!("{}:{}", entry.native_channel, entry.native_symbol)
}

/// One subscribe frame per (channel, symbol) topic.
fn subscribe_frame(entry: &StreamEntry, id: u64) -> String {
    serde_json::json!({
        "id": id,
        "type": "subscribe",
        "topic": format!("/contractMarket/{}:{}", entry.native_channel, entry.native_symbol),
        "privateChannel": false,
        "response": true
    })
    .to_string()
}

/// GET `/api/v1/level2/depth?symbol={symbol}&depth=depth{n}`.
fn snapshot_url(rest_base: &str, native_symbol: &str, depth: u32) -> String {
    format!(
        "{}/api/v1/level2/depth?symbol={}&depth=depth{}",
        rest_base, native_symbol, depth
    )
}

// ── Matcher table ──────────────────────────────────────────────────────

/// Envelope `type` field.
fn msg_type(v: &Value) -> Option<&str> {
    v.get("type")?.as_str()
}

/// Envelope `subject` field (data frames only).
fn subject(v: &Value) -> Option<&str> {
    v.get("subject")?.as_str()
}

/// Administrative frame types consumed without producing events.
const ADMIN_TYPES: &[&str] = &["welcome", "ack", "subscribe", "pong"];

/// The prioritized matcher table.
pub fn matchers() -> Vec<ShapeMatcher> {
    vec![
        ShapeMatcher {
            name: "error",
            claims: |v| msg_type(v) == Some("error"),
            decode: decode_error,
        },
        ShapeMatcher {
            name: "admin",
            claims: |v| matches!(msg_type(v), Some(t) if ADMIN_TYPES.contains(&t)),
            decode: decode_admin,
        },
        ShapeMatcher {
            name: "execution",
            claims: |v| subject(v) == Some("match"),
            decode: decode_trade,
        },
        ShapeMatcher {
            name: "level2",
            claims: |v| subject(v) == Some("level2"),
            decode: decode_book,
        },
    ]
}

fn decode_admin(
    _n: &WireNormalizer,
    v: &Value,
    _receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let name = match msg_type(v) {
        Some("welcome") => "welcome",
        Some("ack") => "ack",
        Some("subscribe") => "subscribe",
        Some("pong") => "pong",
        _ => "control",
    };
    Ok(WireEvent::Admin(name))
}

fn decode_error(
    n: &WireNormalizer,
    v: &Value,
    _receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    tracing::error!(exchange = %n.exchange(), msg = %v, "error from exchange");
    Ok(WireEvent::Admin("error"))
}

fn decode_trade(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    let data = get(v, "data")?;
    let native = str_field(data, "symbol")?;
    let symbol = n.canonical_symbol(native)?;

    Ok(WireEvent::Trade(Trade {
        exchange: n.exchange(),
        symbol,
        trade_id: str_field(data, "tradeId")?.to_string(),
        side: side_from_text(str_field(data, "side")?, "side")?,
        amount: decimal_field(data, "size")?,
        price: decimal_field(data, "price")?,
        // Trade times are nanoseconds, unlike the venue's millisecond
        // book timestamps.
        exchange_ts: Timestamp::from_nanos(u64_field(data, "ts")?),
        receipt_ts,
    }))
}

fn decode_book(
    n: &WireNormalizer,
    v: &Value,
    receipt_ts: Timestamp,
) -> Result<WireEvent, NormalizeError> {
    // The payload carries no symbol; it lives in the topic suffix:
    // `/contractMarket/level2:BTCUSDTPERP`.
    let topic = str_field(v, "topic")?;
    let native = topic.split(':').next_back().unwrap_or(topic);
    let symbol = n.canonical_symbol(native)?;

    let data = get(v, "data")?;
    let sequence = u64_field(data, "sequence")?;
    let exchange_ts = n.event_time(u64_field(data, "timestamp")?);
    let (price, side, size) = parse_change(str_field(data, "change")?)?;

    let (bids, asks) = match side {
        Side::Buy => (vec![(price, size)], Vec::new()),
        Side::Sell => (Vec::new(), vec![(price, size)]),
    };

    Ok(WireEvent::Book(RawBookUpdate {
        symbol,
        native_symbol: native.to_string(),
        first_sequence: sequence,
        last_sequence: sequence,
        exchange_ts: Some(exchange_ts),
        receipt_ts,
        bids,
        asks,
    }))
}

/// Split a `"price,side,size"` change string.
fn parse_change(change: &str) -> Result<(Decimal, Side, Decimal), NormalizeError> {
    let mut parts = change.split(',');
    let (Some(price), Some(side), Some(size), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(NormalizeError::BadField {
            field: "change",
            detail: format!("expected `price,side,size`, got `{change}`"),
        });
    };

    Ok((
        parse_decimal(price, "change")?,
        side_from_text(side, "change")?,
        parse_decimal(size, "change")?,
    ))
}

/// Parse a `/api/v1/level2/depth` response body.
///
/// Snapshot levels arrive as bare number tokens, not strings; they decode
/// from their literal text so sizes and prices stay exact.
pub fn parse_snapshot(body: &str) -> Result<RawSnapshot, SnapshotError> {
    let v: Value =
        serde_json::from_str(body).map_err(|e| SnapshotError::Malformed(e.to_string()))?;

    let code = v.get("code").and_then(Value::as_str).unwrap_or_default();
    if code != "200000" {
        return Err(SnapshotError::Malformed(format!(
            "unexpected response code `{code}`"
        )));
    }

    let data = v
        .get("data")
        .ok_or_else(|| SnapshotError::Malformed("missing `data`".to_string()))?;
    let sequence = data
        .get("sequence")
        .and_then(Value::as_u64)
        .ok_or_else(|| SnapshotError::Malformed("missing `sequence`".to_string()))?;
    let exchange_ts = data.get("ts").and_then(Value::as_u64).map(Timestamp::from_nanos);

    Ok(RawSnapshot {
        sequence,
        bids: parse_snapshot_levels(data.get("bids"), "bids")?,
        asks: parse_snapshot_levels(data.get("asks"), "asks")?,
        exchange_ts,
    })
}

fn parse_snapshot_levels(
    v: Option<&Value>,
    field: &'static str,
) -> Result<Vec<(Decimal, Decimal)>, SnapshotError> {
    let levels = v
        .and_then(Value::as_array)
        .ok_or_else(|| SnapshotError::Malformed(format!("missing `{field}` array")))?;

    levels
        .iter()
        .map(|pair| {
            let pair = pair
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| {
                    SnapshotError::Malformed(format!("`{field}` entry is not a pair"))
                })?;
            let price = to_decimal(&pair[0], field).map_err(|e| {
                SnapshotError::Malformed(e.to_string())
            })?;
            let size = to_decimal(&pair[1], field).map_err(|e| {
                SnapshotError::Malformed(e.to_string())
            })?;
            Ok((price, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{Instrument, SymbolCodec};
    use cf_core::types::Symbol;

    const TRADE_FRAME: &str = r#"{
        "data": {
            "makerUserId": "14262470",
            "symbol": "BTCUSDTPERP",
            "sequence": 659294,
            "side": "buy",
            "size": 1,
            "price": 19155.0,
            "takerOrderId": "6355476b9a81490007ac4c4a",
            "makerOrderId": "635547325562920007e49fc8",
            "takerUserId": "14330687",
            "tradeId": "6355476b244b7900011a4f5f",
            "ts": 1666533227264166601
        },
        "subject": "match",
        "topic": "/contractMarket/execution:BTCUSDTPERP",
        "type": "message"
    }"#;

    const BOOK_FRAME: &str = r#"{
        "data": {
            "sequence": 1666242551380,
            "change": "55.29,sell,0",
            "timestamp": 1666544751415
        },
        "subject": "level2",
        "topic": "/contractMarket/level2:BTCUSDTPERP",
        "type": "message"
    }"#;

    const SNAPSHOT_BODY: &str = r#"{
        "code": "200000",
        "data": {
            "symbol": "BTCUSDTPERP",
            "sequence": 1666242556001,
            "asks": [[55.6, 157], [55.61, 150]],
            "bids": [[55.51, 150], [55.5, 90]],
            "ts": 1666546818854988483
        }
    }"#;

    fn normalizer() -> WireNormalizer {
        let mut codec = SymbolCodec::new(ExchangeId::PoloniexFutures);
        codec.register("BTCUSDTPERP", &Instrument::perpetual("BTC", "USDT"));
        WireNormalizer::new(
            ExchangeId::PoloniexFutures,
            TimeUnit::Millis,
            codec,
            matchers(),
        )
    }

    fn recv() -> Timestamp {
        Timestamp::from_nanos(1666533227500000000)
    }

    #[test]
    fn test_decode_trade_with_nanosecond_time() {
        let event = normalizer().normalize(TRADE_FRAME, recv()).unwrap();
        let WireEvent::Trade(trade) = event else {
            panic!("expected trade");
        };

        assert_eq!(trade.symbol, Symbol::new("BTC-USDT-PERP"));
        assert_eq!(trade.trade_id, "6355476b244b7900011a4f5f");
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.amount, Decimal::ONE);
        assert_eq!(trade.price, "19155.0".parse::<Decimal>().unwrap());
        assert_eq!(
            trade.exchange_ts,
            Timestamp::from_nanos(1666533227264166601)
        );
    }

    #[test]
    fn test_decode_book_change_removal() {
        let event = normalizer().normalize(BOOK_FRAME, recv()).unwrap();
        let WireEvent::Book(update) = event else {
            panic!("expected book update");
        };

        assert_eq!(update.symbol, Symbol::new("BTC-USDT-PERP"));
        assert_eq!(update.native_symbol, "BTCUSDTPERP");
        assert_eq!(update.first_sequence, 1666242551380);
        assert_eq!(update.last_sequence, 1666242551380);
        assert_eq!(
            update.exchange_ts,
            Some(Timestamp::from_millis(1666544751415))
        );
        assert!(update.bids.is_empty());
        assert_eq!(update.asks.len(), 1);
        assert_eq!(update.asks[0].0, "55.29".parse::<Decimal>().unwrap());
        assert!(update.asks[0].1.is_zero());
    }

    #[test]
    fn test_decode_book_change_bid_upsert() {
        let frame = BOOK_FRAME.replace("55.29,sell,0", "55.30,buy,412");
        let event = normalizer().normalize(&frame, recv()).unwrap();
        let WireEvent::Book(update) = event else {
            panic!("expected book update");
        };

        assert!(update.asks.is_empty());
        assert_eq!(update.bids[0].0, "55.30".parse::<Decimal>().unwrap());
        assert_eq!(update.bids[0].1, "412".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_admin_frames_are_consumed_silently() {
        let n = normalizer();
        for frame in [
            r#"{"type": "welcome", "id": "abc"}"#,
            r#"{"type": "ack", "id": "1"}"#,
            r#"{"type": "subscribe", "id": "2"}"#,
            r#"{"type": "pong", "id": "3"}"#,
        ] {
            let event = n.normalize(frame, recv()).unwrap();
            assert!(matches!(event, WireEvent::Admin(_)), "frame: {frame}");
        }
    }

    #[test]
    fn test_error_frame_does_not_kill_decoding() {
        let event = normalizer()
            .normalize(r#"{"type": "error", "code": 404, "data": "topic not found"}"#, recv())
            .unwrap();
        assert!(matches!(event, WireEvent::Admin("error")));
    }

    #[test]
    fn test_invalid_change_string_is_dropped() {
        let frame = BOOK_FRAME.replace("55.29,sell,0", "55.29,sell");
        assert!(normalizer().normalize(&frame, recv()).is_none());

        let frame = BOOK_FRAME.replace("55.29,sell,0", "55.29,hold,0");
        assert!(normalizer().normalize(&frame, recv()).is_none());
    }

    #[test]
    fn test_parse_snapshot_number_tokens_stay_exact() {
        let snapshot = parse_snapshot(SNAPSHOT_BODY).unwrap();
        assert_eq!(snapshot.sequence, 1666242556001);
        assert_eq!(snapshot.asks[0].0, "55.6".parse::<Decimal>().unwrap());
        assert_eq!(snapshot.asks[0].1, "157".parse::<Decimal>().unwrap());
        assert_eq!(snapshot.bids[1].0, "55.5".parse::<Decimal>().unwrap());
        assert_eq!(
            snapshot.exchange_ts,
            Some(Timestamp::from_nanos(1666546818854988483))
        );
    }

    #[test]
    fn test_parse_snapshot_rejects_error_code() {
        let result = parse_snapshot(r#"{"code": "429000", "msg": "Too Many Requests"}"#);
        assert!(matches!(result, Err(SnapshotError::Malformed(_))));
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let entry = StreamEntry {
            channel: Channel::L2Book,
            native_channel: "level2".to_string(),
            symbol: Symbol::new("BTC-USDT-PERP"),
            native_symbol: "BTCUSDTPERP".to_string(),
        };
        let frame = subscribe_frame(&entry, 7);
        let v: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(v["id"], 7);
        assert_eq!(v["type"], "subscribe");
        assert_eq!(v["topic"], "/contractMarket/level2:BTCUSDTPERP");
        assert_eq!(v["privateChannel"], false);
        assert_eq!(v["response"], true);
    }

    #[test]
    fn test_snapshot_url() {
        assert_eq!(
            snapshot_url("https://futures-api.poloniex.com", "BTCUSDTPERP", 100),
            "https://futures-api.poloniex.com/api/v1/level2/depth?symbol=BTCUSDTPERP&depth=depth100"
        );
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(channel_name(Channel::L2Book), Some("level2"));
        assert_eq!(channel_name(Channel::Trades), Some("execution"));
        assert_eq!(channel_name(Channel::Ticker), None);
        assert_eq!(channel_name(Channel::Funding), None);
    }

    #[test]
    fn test_unknown_symbol_in_topic_is_dropped() {
        let frame = BOOK_FRAME.replace("BTCUSDTPERP", "ETHUSDTPERP");
        assert!(normalizer().normalize(&frame, recv()).is_none());
    }
}
