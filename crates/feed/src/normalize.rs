//! Table-driven normalization of raw exchange frames.
//!
//! Raw messages are untyped JSON documents; which kind of update a frame
//! carries is signalled by an explicit discriminator on some venues and
//! only by key-shape on others. A [`WireNormalizer`] runs a prioritized
//! list of [`ShapeMatcher`]s — each either claims a frame or declines it —
//! and the claiming matcher's decode function produces a typed
//! [`WireEvent`]. Unrecognized shapes and decode failures are logged and
//! dropped, never raised as fatal errors.

use rust_decimal::Decimal;
use serde_json::Value;

use cf_core::types::{
    ExchangeId, FundingUpdate, Liquidation, Side, Symbol, Ticker, TimeUnit, Timestamp, Trade,
};

use crate::error::NormalizeError;
use crate::symbols::SymbolCodec;

/// A sequence-carrying book update prior to consistency checking.
///
/// For venues reporting a first/last identifier pair the two fields differ;
/// venues with a single sequence number set both to the same value.
#[derive(Debug, Clone)]
pub struct RawBookUpdate {
    /// Canonical instrument.
    pub symbol: Symbol,
    /// Venue-native symbol, kept for the snapshot fetch URL.
    pub native_symbol: String,
    /// First update identifier covered by this message.
    pub first_sequence: u64,
    /// Last update identifier covered by this message.
    pub last_sequence: u64,
    /// Exchange-reported event time, when present.
    pub exchange_ts: Option<Timestamp>,
    /// Local receipt time of the source frame.
    pub receipt_ts: Timestamp,
    /// Bid level changes (size zero = removal).
    pub bids: Vec<(Decimal, Decimal)>,
    /// Ask level changes (size zero = removal).
    pub asks: Vec<(Decimal, Decimal)>,
}

/// One decoded wire message.
#[derive(Debug, Clone)]
pub enum WireEvent {
    /// Individual trade.
    Trade(Trade),
    /// Best bid/ask quote.
    Ticker(Ticker),
    /// Forced liquidation.
    Liquidation(Liquidation),
    /// Funding rate update.
    Funding(FundingUpdate),
    /// Order book update, routed through the synchronizer.
    Book(RawBookUpdate),
    /// Administrative frame (welcome, ack, subscription confirmation);
    /// consumed without producing a canonical event.
    Admin(&'static str),
}

/// Decode function for a claimed frame.
pub type DecodeFn =
    fn(&WireNormalizer, &Value, Timestamp) -> Result<WireEvent, NormalizeError>;

/// One entry of the prioritized matcher table.
pub struct ShapeMatcher {
    /// Matcher name, for logging.
    pub name: &'static str,
    /// Returns `true` if this matcher claims the frame.
    pub claims: fn(&Value) -> bool,
    /// Decodes a claimed frame.
    pub decode: DecodeFn,
}

/// Per-venue frame classifier and decoder.
pub struct WireNormalizer {
    exchange: ExchangeId,
    time_unit: TimeUnit,
    codec: SymbolCodec,
    matchers: Vec<ShapeMatcher>,
}

impl WireNormalizer {
    /// Create a normalizer from a venue's matcher table.
    pub fn new(
        exchange: ExchangeId,
        time_unit: TimeUnit,
        codec: SymbolCodec,
        matchers: Vec<ShapeMatcher>,
    ) -> Self {
        Self {
            exchange,
            time_unit,
            codec,
            matchers,
        }
    }

    /// The venue this normalizer decodes for.
    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// The venue's default event-time unit.
    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// The venue's symbol table.
    pub fn codec(&self) -> &SymbolCodec {
        &self.codec
    }

    /// Interpret a raw event-time value in the venue's default unit.
    pub fn event_time(&self, raw: u64) -> Timestamp {
        Timestamp::from_unit(raw, self.time_unit)
    }

    /// Resolve a venue-native symbol to its canonical form.
    pub fn canonical_symbol(&self, native: &str) -> Result<Symbol, NormalizeError> {
        self.codec
            .canonical(native)
            .cloned()
            .ok_or_else(|| NormalizeError::UnknownSymbol(native.to_string()))
    }

    /// Classify and decode one raw frame.
    ///
    /// Returns `None` when the frame is unrecognized or fails to decode;
    /// both cases are logged and never affect synchronization state.
    pub fn normalize(&self, raw: &str, receipt_ts: Timestamp) -> Option<WireEvent> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    exchange = %self.exchange,
                    error = %e,
                    "dropping non-JSON frame"
                );
                return None;
            }
        };

        for matcher in &self.matchers {
            if !(matcher.claims)(&value) {
                continue;
            }
            return match (matcher.decode)(self, &value, receipt_ts) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(
                        exchange = %self.exchange,
                        matcher = matcher.name,
                        error = %e,
                        "dropping undecodable frame"
                    );
                    None
                }
            };
        }

        tracing::warn!(
            exchange = %self.exchange,
            msg = raw,
            "unexpected message received"
        );
        None
    }
}

// ── Field decode helpers shared by the per-venue tables ────────────────

/// Look up a required field on a JSON object.
pub fn get<'a>(obj: &'a Value, key: &'static str) -> Result<&'a Value, NormalizeError> {
    obj.get(key).ok_or(NormalizeError::MissingField(key))
}

/// Required string field.
pub fn str_field<'a>(obj: &'a Value, key: &'static str) -> Result<&'a str, NormalizeError> {
    get(obj, key)?
        .as_str()
        .ok_or_else(|| NormalizeError::BadField {
            field: key,
            detail: "expected a string".to_string(),
        })
}

/// Required unsigned integer field.
pub fn u64_field(obj: &Value, key: &'static str) -> Result<u64, NormalizeError> {
    get(obj, key)?
        .as_u64()
        .ok_or_else(|| NormalizeError::BadField {
            field: key,
            detail: "expected an unsigned integer".to_string(),
        })
}

/// Required boolean field.
pub fn bool_field(obj: &Value, key: &'static str) -> Result<bool, NormalizeError> {
    get(obj, key)?
        .as_bool()
        .ok_or_else(|| NormalizeError::BadField {
            field: key,
            detail: "expected a boolean".to_string(),
        })
}

/// Decode a JSON value into an exact decimal.
///
/// Accepts string-encoded decimals (the common wire form) and bare number
/// tokens. Number tokens decode from their literal text, never through
/// binary floating point.
pub fn to_decimal(v: &Value, field: &'static str) -> Result<Decimal, NormalizeError> {
    let text = match v {
        Value::String(s) => s.as_str(),
        Value::Number(n) => return parse_decimal(&n.to_string(), field),
        other => {
            return Err(NormalizeError::BadField {
                field,
                detail: format!("expected a decimal, got {other}"),
            })
        }
    };
    parse_decimal(text, field)
}

/// Required decimal field on a JSON object.
pub fn decimal_field(obj: &Value, key: &'static str) -> Result<Decimal, NormalizeError> {
    to_decimal(get(obj, key)?, key)
}

/// Parse a string-encoded decimal exactly.
pub fn parse_decimal(text: &str, field: &'static str) -> Result<Decimal, NormalizeError> {
    text.parse::<Decimal>().map_err(|e| NormalizeError::BadField {
        field,
        detail: format!("invalid decimal `{text}`: {e}"),
    })
}

/// Decode a `"buy"` / `"sell"` (any case) side encoding.
pub fn side_from_text(s: &str, field: &'static str) -> Result<Side, NormalizeError> {
    if s.eq_ignore_ascii_case("buy") {
        Ok(Side::Buy)
    } else if s.eq_ignore_ascii_case("sell") {
        Ok(Side::Sell)
    } else {
        Err(NormalizeError::BadField {
            field,
            detail: format!("unknown side `{s}`"),
        })
    }
}

/// Decode a maker-flag side encoding.
///
/// A true flag means the buyer placed the resting order, so the aggressor
/// (taker) side was the seller.
pub fn side_from_maker_flag(is_buyer_maker: bool) -> Side {
    if is_buyer_maker {
        Side::Sell
    } else {
        Side::Buy
    }
}
