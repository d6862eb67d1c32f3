//! Book ordering for the two sides.
//!
//! ## Priority
//!
//! 1. Price: descending on the buy side, ascending on the sell side
//! 2. Individual orders (`Scope::Order`) after every other scope
//! 3. Individual orders among themselves: `(time_sequence, index)` ascending
//! 4. Other scopes: size descending, then `time_sequence`, scope, exchange
//!    code, market maker and index ascending
//!
//! The index is the last key in both branches, so two distinct orders of
//! the same book never compare equal.

use std::cmp::Ordering;

use crate::tree::Comparator;
use crate::types::{Order, Scope, Side};

/// Buy side: best (highest) price first.
pub fn buy_priority(a: &Order, b: &Order) -> Ordering {
    b.price.cmp(&a.price).then_with(|| same_price_priority(a, b))
}

/// Sell side: best (lowest) price first.
pub fn sell_priority(a: &Order, b: &Order) -> Ordering {
    a.price.cmp(&b.price).then_with(|| same_price_priority(a, b))
}

/// Comparator of the book for `side`.
pub fn for_side(side: Side) -> Comparator<Order> {
    match side {
        Side::Buy => buy_priority,
        Side::Sell => sell_priority,
    }
}

fn same_price_priority(a: &Order, b: &Order) -> Ordering {
    let a_individual = a.scope == Scope::Order;
    let b_individual = b.scope == Scope::Order;
    match (a_individual, b_individual) {
        (true, true) => a
            .time_sequence()
            .cmp(&b.time_sequence())
            .then(a.index.cmp(&b.index)),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b
            .size
            .cmp(&a.size)
            .then(a.time_sequence().cmp(&b.time_sequence()))
            .then(a.scope.cmp(&b.scope))
            .then(a.exchange_code.cmp(&b.exchange_code))
            .then_with(|| a.market_maker.cmp(&b.market_maker))
            .then(a.index.cmp(&b.index)),
    }
}
