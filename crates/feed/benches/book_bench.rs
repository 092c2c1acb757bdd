//! Benchmarks for `OrderBook` operations using criterion.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use cf_feed::book::{BookSide, OrderBook};

/// Build a book pre-populated with `n` levels on each side.
fn populated_book(n: i64) -> OrderBook {
    let bids: Vec<(Decimal, Decimal)> = (0..n)
        .map(|i| (Decimal::new(5_000_000 - i * 100, 2), Decimal::new(100_000 + i * 1_000, 8)))
        .collect();
    let asks: Vec<(Decimal, Decimal)> = (0..n)
        .map(|i| (Decimal::new(5_000_100 + i * 100, 2), Decimal::new(100_000 + i * 1_000, 8)))
        .collect();

    let mut book = OrderBook::new(None);
    book.load_snapshot(&bids, &asks, 1);
    book
}

fn bench_apply_levels(c: &mut Criterion) {
    let mut book = populated_book(100);

    // Typical delta: 5 bid + 5 ask levels.
    let bids: Vec<(Decimal, Decimal)> = (0..5)
        .map(|i| (Decimal::new(4_999_500 + i * 100, 2), Decimal::new(50_000 + i * 1_000, 8)))
        .collect();
    let asks: Vec<(Decimal, Decimal)> = (0..5)
        .map(|i| (Decimal::new(5_000_600 + i * 100, 2), Decimal::new(50_000 + i * 1_000, 8)))
        .collect();

    c.bench_function("apply_10_levels", |b| {
        b.iter(|| {
            for &(price, size) in &bids {
                black_box(book.apply_level(BookSide::Bid, price, size));
            }
            for &(price, size) in &asks {
                black_box(book.apply_level(BookSide::Ask, price, size));
            }
        })
    });
}

fn bench_load_snapshot(c: &mut Criterion) {
    let bids: Vec<(Decimal, Decimal)> = (0..1_000i64)
        .map(|i| (Decimal::new(5_000_000 - i * 10, 2), Decimal::new(100_000, 8)))
        .collect();
    let asks: Vec<(Decimal, Decimal)> = (0..1_000i64)
        .map(|i| (Decimal::new(5_000_100 + i * 10, 2), Decimal::new(100_000, 8)))
        .collect();

    c.bench_function("load_snapshot_1000_levels", |b| {
        let mut book = OrderBook::new(None);
        b.iter(|| {
            book.load_snapshot(black_box(&bids), black_box(&asks), 1);
        })
    });
}

fn bench_best_levels(c: &mut Criterion) {
    let book = populated_book(1_000);

    c.bench_function("best_bid_ask", |b| {
        b.iter(|| {
            black_box(book.best_bid());
            black_box(book.best_ask());
        })
    });
}

criterion_group!(benches, bench_apply_levels, bench_load_snapshot, bench_best_levels);
criterion_main!(benches);
