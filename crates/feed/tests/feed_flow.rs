//! End-to-end feed flow: raw frames in, canonical events out.
//!
//! Drives the normalizer and synchronizer together with a scripted
//! snapshot fetcher, the way a live connection task does, and checks the
//! event stream consumers would observe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use cf_core::types::{ExchangeId, MarketEvent, Symbol, Timestamp};
use cf_feed::dispatch::EventDispatcher;
use cf_feed::error::SnapshotError;
use cf_feed::exchanges::{binance, poloniex};
use cf_feed::normalize::{WireEvent, WireNormalizer};
use cf_feed::symbols::{Instrument, SymbolCodec};
use cf_feed::sync::{OrderBookSynchronizer, RawSnapshot, SnapshotFetcher};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Scripted fetcher: pops one response per bootstrap, counting calls.
struct ScriptedFetcher {
    responses: Mutex<VecDeque<RawSnapshot>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(responses: Vec<RawSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SnapshotFetcher for ScriptedFetcher {
    async fn fetch(&self, _native_symbol: &str, _depth: u32) -> Result<RawSnapshot, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| SnapshotError::Malformed("script exhausted".to_string()))
    }
}

fn snapshot(sequence: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> RawSnapshot {
    RawSnapshot {
        sequence,
        bids: bids.iter().map(|(p, s)| (dec(p), dec(s))).collect(),
        asks: asks.iter().map(|(p, s)| (dec(p), dec(s))).collect(),
        exchange_ts: None,
    }
}

/// Push one raw frame through normalizer + synchronizer.
async fn feed_frame(
    normalizer: &WireNormalizer,
    sync: &mut OrderBookSynchronizer,
    frame: &str,
    receipt_ts: Timestamp,
) {
    match normalizer.normalize(frame, receipt_ts) {
        Some(WireEvent::Book(update)) => {
            let _ = sync.on_delta(update).await;
        }
        Some(_) | None => {}
    }
}

fn binance_normalizer() -> WireNormalizer {
    let mut codec = SymbolCodec::new(ExchangeId::Binance);
    codec.register("BTCUSDT", &Instrument::spot("BTC", "USDT"));
    let profile = binance::profile();
    WireNormalizer::new(
        profile.exchange,
        profile.time_unit,
        codec,
        (profile.matchers)(),
    )
}

fn poloniex_normalizer() -> WireNormalizer {
    let mut codec = SymbolCodec::new(ExchangeId::PoloniexFutures);
    codec.register("BTCUSDTPERP", &Instrument::perpetual("BTC", "USDT"));
    let profile = poloniex::profile();
    WireNormalizer::new(
        profile.exchange,
        profile.time_unit,
        codec,
        (profile.matchers)(),
    )
}

fn depth_frame(first: u64, last: u64, bids: &str, asks: &str) -> String {
    format!(
        r#"{{"stream":"btcusdt@depth@100ms","data":{{"e":"depthUpdate","E":1706000000000,"s":"BTCUSDT","U":{first},"u":{last},"b":{bids},"a":{asks}}}}}"#
    )
}

#[tokio::test]
async fn binance_snapshot_then_delta_scenario() {
    // Snapshot {160, bids [(50,10)], asks [(51,5)]} then delta
    // {U:161, u:162, bids [(50,0)], asks [(51,8)]}.
    let fetcher = ScriptedFetcher::new(vec![snapshot(160, &[("50", "10")], &[("51", "5")])]);
    let dispatcher = EventDispatcher::new();
    let rx = dispatcher.subscribe();
    let normalizer = binance_normalizer();
    let profile = binance::profile();
    let mut sync = OrderBookSynchronizer::new(
        profile.exchange,
        profile.policy,
        1000,
        None,
        Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
        dispatcher,
    );

    let frame = depth_frame(161, 162, r#"[["50","0"]]"#, r#"[["51","8"]]"#);
    feed_frame(&normalizer, &mut sync, &frame, Timestamp::from_millis(1)).await;

    let events: Vec<MarketEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 2);

    let MarketEvent::BookSnapshot(ref snap) = events[0] else {
        panic!("expected snapshot first, got {:?}", events[0]);
    };
    assert_eq!(snap.symbol, Symbol::new("BTC-USDT"));
    assert_eq!(snap.sequence, 160);
    assert_eq!(snap.bids[0].price, dec("50"));
    assert_eq!(snap.asks[0].price, dec("51"));

    let MarketEvent::BookDelta(ref delta) = events[1] else {
        panic!("expected delta second, got {:?}", events[1]);
    };
    assert!(delta.forced);
    assert_eq!(delta.bids.len(), 1);
    assert!(delta.bids[0].size.is_zero());
    assert_eq!(delta.asks[0].size, dec("8"));

    // Final book: bids empty, asks {51: 8}.
    let book = sync.store().get(&Symbol::new("BTC-USDT")).unwrap();
    assert_eq!(book.level_count(), (0, 1));
    assert_eq!(book.best_ask().unwrap().price, dec("51"));
    assert_eq!(book.best_ask().unwrap().size, dec("8"));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn binance_gap_forces_silent_window_then_fresh_snapshot() {
    let fetcher = ScriptedFetcher::new(vec![
        snapshot(100, &[("50", "10")], &[("51", "5")]),
        snapshot(300, &[("52", "1")], &[("53", "2")]),
    ]);
    let dispatcher = EventDispatcher::new();
    let rx = dispatcher.subscribe();
    let normalizer = binance_normalizer();
    let profile = binance::profile();
    let mut sync = OrderBookSynchronizer::new(
        profile.exchange,
        profile.policy,
        1000,
        None,
        Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
        dispatcher,
    );

    // Bootstrap + first delta.
    let frame = depth_frame(99, 101, r#"[["50","11"]]"#, "[]");
    feed_frame(&normalizer, &mut sync, &frame, Timestamp::from_millis(1)).await;
    assert_eq!(rx.try_iter().count(), 2);

    // Gap: expected 102, got 150. Book destroyed, nothing emitted.
    let frame = depth_frame(150, 151, r#"[["50","12"]]"#, "[]");
    feed_frame(&normalizer, &mut sync, &frame, Timestamp::from_millis(2)).await;
    assert!(sync.store().get(&Symbol::new("BTC-USDT")).is_none());
    assert_eq!(
        rx.try_iter().count(),
        0,
        "consumers see nothing between gap and resync"
    );

    // Next delta triggers exactly one fresh bootstrap; the forced
    // snapshot is the resumption signal.
    let frame = depth_frame(299, 301, r#"[["52","9"]]"#, "[]");
    feed_frame(&normalizer, &mut sync, &frame, Timestamp::from_millis(3)).await;
    assert_eq!(fetcher.calls(), 2);

    let events: Vec<MarketEvent> = rx.try_iter().collect();
    assert!(matches!(events[0], MarketEvent::BookSnapshot(_)));
    let book = sync.store().get(&Symbol::new("BTC-USDT")).unwrap();
    assert_eq!(book.last_sequence(), 301);
}

#[tokio::test]
async fn poloniex_strict_single_level_changes() {
    let fetcher = ScriptedFetcher::new(vec![snapshot(
        1000,
        &[("55.51", "150")],
        &[("55.6", "157")],
    )]);
    let dispatcher = EventDispatcher::new();
    let rx = dispatcher.subscribe();
    let normalizer = poloniex_normalizer();
    let profile = poloniex::profile();
    let mut sync = OrderBookSynchronizer::new(
        profile.exchange,
        profile.policy,
        100,
        None,
        Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
        dispatcher,
    );

    let frame = |seq: u64, change: &str| {
        format!(
            r#"{{"data":{{"sequence":{seq},"change":"{change}","timestamp":1666544751415}},"subject":"level2","topic":"/contractMarket/level2:BTCUSDTPERP","type":"message"}}"#
        )
    };

    // seq 1001: new bid level.
    feed_frame(&normalizer, &mut sync, &frame(1001, "55.52,buy,90"), Timestamp::from_nanos(1)).await;
    // seq 1001 replayed: silently discarded.
    feed_frame(&normalizer, &mut sync, &frame(1001, "55.52,buy,999"), Timestamp::from_nanos(2)).await;
    // seq 1002: remove the snapshot ask.
    feed_frame(&normalizer, &mut sync, &frame(1002, "55.6,sell,0"), Timestamp::from_nanos(3)).await;

    let sym = Symbol::new("BTC-USDT-PERP");
    let book = sync.store().get(&sym).unwrap();
    assert_eq!(book.last_sequence(), 1002);
    assert_eq!(book.level_count(), (2, 0));
    assert_eq!(book.best_bid().unwrap().price, dec("55.52"));
    assert_eq!(book.best_bid().unwrap().size, dec("90"), "duplicate did not overwrite");

    let events: Vec<MarketEvent> = rx.try_iter().collect();
    // snapshot + two deltas; the duplicate emitted nothing.
    assert_eq!(events.len(), 3);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn admin_and_trade_frames_do_not_touch_book_state() {
    let fetcher = ScriptedFetcher::new(vec![]);
    let dispatcher = EventDispatcher::new();
    let normalizer = poloniex_normalizer();
    let profile = poloniex::profile();
    let mut sync = OrderBookSynchronizer::new(
        profile.exchange,
        profile.policy,
        100,
        None,
        Arc::clone(&fetcher) as Arc<dyn SnapshotFetcher>,
        dispatcher,
    );

    for frame in [
        r#"{"type":"welcome","id":"x"}"#,
        r#"{"type":"ack","id":"1"}"#,
        r#"{"data":{"symbol":"BTCUSDTPERP","side":"buy","size":1,"price":19155.0,"tradeId":"t1","ts":1666533227264166601},"subject":"match","topic":"/contractMarket/execution:BTCUSDTPERP","type":"message"}"#,
    ] {
        feed_frame(&normalizer, &mut sync, frame, Timestamp::from_nanos(1)).await;
    }

    assert!(sync.store().is_empty());
    assert_eq!(fetcher.calls(), 0, "non-book frames never fetch snapshots");
}
