//! Bidirectional mapping between exchange-native and canonical symbols.
//!
//! Each venue names the same instrument differently (`BTCUSDT`,
//! `BTCUSDTPERP`, ...). The codec interns one canonical identifier per
//! instrument, built from its base/quote currencies and instrument type,
//! and translates in both directions for subscription building and
//! message decoding.

use std::collections::HashMap;

use cf_core::types::{ExchangeId, Symbol};

/// Instrument type, reflected in the canonical identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Spot pair.
    Spot,
    /// Linear perpetual contract.
    Perpetual,
}

/// Instrument definition as reported by a venue's instrument endpoint.
#[derive(Debug, Clone)]
pub struct Instrument {
    /// Base currency (e.g., `BTC`).
    pub base: String,
    /// Quote currency (e.g., `USDT`).
    pub quote: String,
    /// Instrument type.
    pub kind: InstrumentKind,
}

impl Instrument {
    /// Define a spot instrument.
    pub fn spot(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
            kind: InstrumentKind::Spot,
        }
    }

    /// Define a linear perpetual instrument.
    pub fn perpetual(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
            kind: InstrumentKind::Perpetual,
        }
    }

    /// The canonical identifier for this instrument: `BASE-QUOTE` for spot,
    /// `BASE-QUOTE-PERP` for perpetuals.
    pub fn canonical(&self) -> Symbol {
        match self.kind {
            InstrumentKind::Spot => Symbol::new(format!("{}-{}", self.base, self.quote)),
            InstrumentKind::Perpetual => {
                Symbol::new(format!("{}-{}-PERP", self.base, self.quote))
            }
        }
    }
}

/// Per-venue symbol table. Canonical symbols are interned on registration
/// and immutable afterwards.
#[derive(Debug, Clone)]
pub struct SymbolCodec {
    exchange: ExchangeId,
    to_canonical: HashMap<String, Symbol>,
    to_native: HashMap<Symbol, String>,
}

impl SymbolCodec {
    /// Create an empty codec for one venue.
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            to_canonical: HashMap::new(),
            to_native: HashMap::new(),
        }
    }

    /// The venue this codec translates for.
    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// Register one instrument under its exchange-native name, returning
    /// the interned canonical symbol.
    pub fn register(&mut self, native: impl Into<String>, instrument: &Instrument) -> Symbol {
        let native = native.into();
        let canonical = instrument.canonical();
        self.to_canonical.insert(native.clone(), canonical.clone());
        self.to_native.insert(canonical.clone(), native);
        canonical
    }

    /// Translate an exchange-native name to its canonical symbol.
    pub fn canonical(&self, native: &str) -> Option<&Symbol> {
        self.to_canonical.get(native)
    }

    /// Translate a canonical symbol back to the venue's native name.
    pub fn native(&self, symbol: &Symbol) -> Option<&str> {
        self.to_native.get(symbol).map(String::as_str)
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.to_canonical.len()
    }

    /// Returns `true` if no instruments are registered.
    pub fn is_empty(&self) -> bool {
        self.to_canonical.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_canonical_form() {
        let inst = Instrument::spot("BTC", "USDT");
        assert_eq!(inst.canonical(), Symbol::new("BTC-USDT"));
    }

    #[test]
    fn test_perpetual_canonical_form() {
        let inst = Instrument::perpetual("BTC", "USDT");
        assert_eq!(inst.canonical(), Symbol::new("BTC-USDT-PERP"));
    }

    #[test]
    fn test_register_round_trip() {
        let mut codec = SymbolCodec::new(ExchangeId::Binance);
        let canonical = codec.register("BTCUSDT", &Instrument::spot("BTC", "USDT"));

        assert_eq!(canonical, Symbol::new("BTC-USDT"));
        assert_eq!(codec.canonical("BTCUSDT"), Some(&Symbol::new("BTC-USDT")));
        assert_eq!(codec.native(&Symbol::new("BTC-USDT")), Some("BTCUSDT"));
        assert_eq!(codec.len(), 1);
    }

    #[test]
    fn test_unknown_lookups_return_none() {
        let codec = SymbolCodec::new(ExchangeId::PoloniexFutures);
        assert!(codec.canonical("BTCUSDTPERP").is_none());
        assert!(codec.native(&Symbol::new("BTC-USDT-PERP")).is_none());
        assert!(codec.is_empty());
    }

    #[test]
    fn test_same_instrument_different_native_names_per_venue() {
        let mut binance = SymbolCodec::new(ExchangeId::Binance);
        let mut poloniex = SymbolCodec::new(ExchangeId::PoloniexFutures);

        let a = binance.register("BTCUSDT", &Instrument::spot("BTC", "USDT"));
        let b = poloniex.register("BTCUSDTPERP", &Instrument::perpetual("BTC", "USDT"));

        // Distinct instruments (spot vs perp) intern distinct canonicals.
        assert_ne!(a, b);
        assert_eq!(poloniex.native(&b), Some("BTCUSDTPERP"));
    }

    #[test]
    fn test_reregistration_overwrites_consistently() {
        let mut codec = SymbolCodec::new(ExchangeId::Binance);
        codec.register("ETHUSDT", &Instrument::spot("ETH", "USDT"));
        codec.register("ETHUSDT", &Instrument::spot("ETH", "USDT"));

        assert_eq!(codec.len(), 1);
        assert_eq!(codec.canonical("ETHUSDT"), Some(&Symbol::new("ETH-USDT")));
    }
}
