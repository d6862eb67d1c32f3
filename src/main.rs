//! Order Book Model - Binary Entry Point
//!
//! Replays a short scripted feed through one engine and prints the
//! visible book after every transaction. Settings come from `ORDERBOOK_*`
//! environment variables (or a `.env` file), logging from `RUST_LOG`.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_model::feed::{EventFlags, OrderEvent};
use orderbook_model::types::price::{from_fixed_trimmed, to_fixed};
use orderbook_model::types::{Order, Scope, Side};
use orderbook_model::{BookChange, BookConfig, BookError, OrderBookEngine, Result};

const DEFAULT_SYMBOL: &str = "IBM";

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "orderbook_model=info".into()))
        .with(fmt::layer())
        .init();

    if let Err(err) = run() {
        error!(%err, "replay failed");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut config = BookConfig::from_env()?;
    let symbol = config.symbol.get_or_insert_with(|| DEFAULT_SYMBOL.to_string()).clone();
    info!(%symbol, filter = %config.filter, lot_size = config.lot_size, correct = config.correct, "starting replay");

    let mut engine = OrderBookEngine::from_config(&config)?;
    engine.add_listener(Arc::new(|change: &BookChange| {
        info!(engine = %change.source(), "book changed");
    }))?;

    for (step, events) in script(&symbol)?.into_iter().enumerate() {
        println!("--- step {} ---", step + 1);
        if engine.process_events(events)? {
            print_book(&engine);
        } else {
            println!("  (no visible change)");
        }
    }

    engine.validate()?;
    let digest = engine.snapshot_digest();
    println!();
    println!("version:    {}", digest.version);
    println!("visible:    {} bid / {} ask", digest.buy_count, digest.sell_count);
    println!("state root: {}", digest.state_root_hex());
    Ok(())
}

/// Snapshot of every scope, a held-back transaction, then removals.
fn script(symbol: &str) -> Result<Vec<Vec<OrderEvent>>> {
    let order = |index: u64, side: Side, scope: Scope, price: &str, size: &str| -> Result<Order> {
        Ok(Order::new(symbol, index, side, scope, fixed(price)?, fixed(size)?))
    };

    Ok(vec![
        vec![
            OrderEvent::new(order(1, Side::Buy, Scope::Composite, "100", "10")?)
                .with_flags(EventFlags::SNAPSHOT_BEGIN),
            OrderEvent::new(order(2, Side::Sell, Scope::Composite, "100.05", "8")?),
            OrderEvent::new(order(3, Side::Buy, Scope::Regional, "100", "4")?.with_exchange(b'Q')),
            OrderEvent::new(
                order(4, Side::Buy, Scope::Aggregate, "99.98", "3")?
                    .with_exchange(b'Q')
                    .with_market_maker("NSDQ")
                    .with_time(1_000, 0),
            ),
            OrderEvent::new(
                order(5, Side::Sell, Scope::Order, "100.06", "1")?
                    .with_exchange(b'Q')
                    .with_market_maker("NSDQ")
                    .with_time(1_001, 0),
            )
            .with_flags(EventFlags::SNAPSHOT_END),
        ],
        vec![
            OrderEvent::new(
                order(6, Side::Buy, Scope::Order, "99.99", "2")?
                    .with_exchange(b'Q')
                    .with_market_maker("NSDQ")
                    .with_time(2_000, 0),
            )
            .with_flags(EventFlags::TX_PENDING),
        ],
        vec![OrderEvent::new(
            order(7, Side::Buy, Scope::Order, "99.99", "5")?
                .with_exchange(b'Q')
                .with_market_maker("NSDQ")
                .with_time(2_000, 1),
        )],
        vec![
            OrderEvent::removal(order(6, Side::Buy, Scope::Order, "0", "0")?),
            OrderEvent::removal(order(7, Side::Buy, Scope::Order, "0", "0")?),
            OrderEvent::removal(order(4, Side::Buy, Scope::Aggregate, "0", "0")?),
        ],
    ])
}

/// Demo amounts are literals, so a parse failure is a typo in the script.
fn fixed(text: &str) -> Result<u64> {
    to_fixed(text).ok_or_else(|| BookError::invalid(format!("not a fixed-point amount: {text}")))
}

fn print_book(engine: &OrderBookEngine) {
    for side in [Side::Sell, Side::Buy] {
        let label = match side {
            Side::Buy => "bid",
            Side::Sell => "ask",
        };
        for order in engine.visible_orders(side) {
            println!(
                "  {label} {:>10} x {:<6} {:?} #{}",
                from_fixed_trimmed(order.price),
                from_fixed_trimmed(order.size),
                order.scope,
                order.index
            );
        }
    }
}
