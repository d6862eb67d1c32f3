//! Benchmarks for the order book engine.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark
//! cargo bench -- upsert
//! ```
//!
//! Results are saved to `target/criterion/` with HTML reports.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use orderbook_model::feed::OrderEvent;
use orderbook_model::tree::CheckedTree;
use orderbook_model::{Order, OrderBookEngine, Scope, Side};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SYMBOL: &str = "IBM";

/// Base price: 100.00000000 (fixed-point, 10^8 scale)
const BASE_PRICE: u64 = 10_000_000_000;

// ============================================================================
// HELPER FUNCTIONS - Deterministic order generation
// ============================================================================

/// Individual order at `BASE_PRICE + step` cents.
fn make_order(index: u64, side: Side, step: u64) -> Order {
    Order::new(SYMBOL, index, side, Scope::Order, BASE_PRICE + step * 1_000_000, 100_000_000)
        .with_exchange(b'Q')
        .with_market_maker("NSDQ")
        .with_time(index, 0)
}

/// Engine holding `count` individual orders per side.
fn populated_engine(count: u64) -> OrderBookEngine {
    let mut engine = OrderBookEngine::with_capacity(count as usize);
    engine.set_symbol(Some(SYMBOL));
    engine.transaction(|book| {
        for i in 0..count {
            book.upsert(make_order(i, Side::Buy, i % 500)).ok();
            book.upsert(make_order(count + i, Side::Sell, 500 + i % 500)).ok();
        }
    });
    engine
}

/// Mixed-scope event stream with updates and removals.
fn generate_events(count: usize, seed: u64) -> Vec<OrderEvent> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let index = rng.gen_range(0..2_000u64);
            let scope = match index % 20 {
                0 => Scope::Regional,
                1..=4 => Scope::Aggregate,
                _ => Scope::Order,
            };
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let size = if rng.gen_bool(0.1) { 0 } else { rng.gen_range(1..100u64) * 100_000_000 };
            let order = Order::new(SYMBOL, index, side, scope, BASE_PRICE + rng.gen_range(0..200u64) * 1_000_000, size)
                .with_exchange(b'A' + (index % 26) as u8)
                .with_market_maker(format!("MM{}", index % 97))
                .with_time(i as u64, 0);
            OrderEvent::new(order)
        })
        .collect()
}

// ============================================================================
// BENCHMARK: Single upsert latency
// ============================================================================

fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("insert_into_10k_book", |b| {
        b.iter_batched(
            || populated_engine(5_000),
            |mut engine| {
                black_box(engine.upsert(make_order(1_000_000, Side::Buy, 250)))
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("reprice_in_10k_book", |b| {
        let mut engine = populated_engine(5_000);
        let mut step = 0u64;
        b.iter(|| {
            step = (step + 1) % 500;
            black_box(engine.upsert(make_order(42, Side::Buy, step)))
        });
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: Event stream throughput
// ============================================================================

fn bench_process_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_events");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(50);

    for batch_size in [1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::new("events", batch_size), &batch_size, |b, &size| {
            b.iter_batched(
                || generate_events(size, 42),
                |events| {
                    let mut engine = OrderBookEngine::for_symbol(SYMBOL);
                    black_box(engine.process_events(events))
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// ============================================================================
// BENCHMARK: Rank queries
// ============================================================================

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");

    let mut tree = CheckedTree::new(<u64 as Ord>::cmp);
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let ids: Vec<_> = (0..100_000u64)
        .filter_map(|value| tree.insert_value(value).ok())
        .collect();
    for &id in ids.iter().step_by(3) {
        tree.uncheck(id);
    }

    group.bench_function("rank_of_in_100k_tree", |b| {
        b.iter(|| {
            let id = ids[rng.gen_range(0..ids.len())];
            black_box(tree.rank_of(id))
        });
    });

    group.bench_function("node_at_rank_in_100k_tree", |b| {
        let len = tree.len();
        b.iter(|| black_box(tree.node_at_rank(rng.gen_range(0..len))));
    });

    group.finish();
}

criterion_group!(benches, bench_upsert, bench_process_events, bench_rank);
criterion_main!(benches);
