//! Heuristic correction of aggregate quotes.
//!
//! Upstream delivery of aggregate (market maker) quotes can be out of
//! order, duplicated, or simply never withdrawn. The corrector remembers
//! the last aggregate quote seen for every index and, when a new quote
//! arrives, compares it against all of them:
//!
//! - a quote that is outdated by a newer one is rejected (tombstoned)
//! - quotes outdated by the new one are tombstoned, and a zero-size
//!   correction is emitted for each so the book drops them
//!
//! "Outdated" means one of:
//!
//! | Condition | Window |
//! |-----------|--------|
//! | same side and price, other index | any age difference |
//! | any quote of the symbol | older by more than `keep_ttl` |
//! | crossed or locked with the other side | older by more than `flip_ttl` |
//!
//! This trades a few false positives for robustness; it proves nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use tracing::debug;

use crate::types::{Order, Scope, Side};

/// Default window after which any quote is considered stale.
pub const DEFAULT_KEEP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default window after which a crossed quote is considered stale.
pub const DEFAULT_FLIP_TTL: Duration = Duration::from_secs(60);

/// Last aggregate quote seen for one index.
#[derive(Debug, Clone)]
struct Tracked {
    order: Order,

    /// Rejected or corrected away; kept to recognize stale repeats
    tombstone: bool,
}

impl Tracked {
    fn live(order: &Order) -> Self {
        Self {
            order: order.clone(),
            tombstone: false,
        }
    }

    fn dead(order: &Order) -> Self {
        Self {
            order: order.clone(),
            tombstone: true,
        }
    }
}

/// Verdict on one order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acceptance {
    /// Whether the order may go into the book unchanged
    pub admitted: bool,

    /// Zero-size removals for quotes the order made stale
    pub corrections: Vec<Order>,
}

/// Pre-filter for aggregate quotes, one record map per tracked symbol.
///
/// ## Example
///
/// ```
/// use orderbook_model::corrector::OrderBookCorrector;
/// use orderbook_model::types::{Order, Scope, Side};
///
/// let mut corrector = OrderBookCorrector::new();
/// corrector.set_symbols(["IBM"]);
///
/// let old = Order::new("IBM", 1, Side::Buy, Scope::Aggregate, 100, 5).with_time(1_000, 0);
/// let new = Order::new("IBM", 2, Side::Buy, Scope::Aggregate, 100, 7).with_time(2_000, 0);
///
/// assert!(corrector.accept(&old).admitted);
/// let verdict = corrector.accept(&new);
/// assert!(verdict.admitted);
/// assert_eq!(verdict.corrections, vec![old.resized(0)]);
/// ```
#[derive(Debug, Clone)]
pub struct OrderBookCorrector {
    /// Milliseconds
    keep_ttl: u64,

    /// Milliseconds
    flip_ttl: u64,

    books: HashMap<String, BTreeMap<u64, Tracked>>,
}

impl Default for OrderBookCorrector {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookCorrector {
    /// Corrector with the default windows (24h / 60s) tracking no symbol.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_KEEP_TTL, DEFAULT_FLIP_TTL)
    }

    /// Corrector with explicit windows tracking no symbol.
    pub fn with_ttl(keep_ttl: Duration, flip_ttl: Duration) -> Self {
        Self {
            keep_ttl: millis(keep_ttl),
            flip_ttl: millis(flip_ttl),
            books: HashMap::new(),
        }
    }

    pub fn keep_ttl(&self) -> Duration {
        Duration::from_millis(self.keep_ttl)
    }

    pub fn flip_ttl(&self) -> Duration {
        Duration::from_millis(self.flip_ttl)
    }

    /// Track exactly `symbols`. Records of symbols that stay are kept.
    pub fn set_symbols<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: HashSet<String> = symbols.into_iter().map(Into::into).collect();
        self.books.retain(|symbol, _| wanted.contains(symbol));
        for symbol in wanted {
            self.books.entry(symbol).or_default();
        }
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.books.contains_key(symbol)
    }

    /// Number of records (live or tombstoned) kept for `symbol`.
    pub fn tracked_len(&self, symbol: &str) -> usize {
        self.books.get(symbol).map_or(0, BTreeMap::len)
    }

    /// Drop every record and every tracked symbol.
    pub fn close(&mut self) {
        self.books.clear();
    }

    /// Judge one order.
    pub fn accept(&mut self, order: &Order) -> Acceptance {
        let mut corrections = Vec::new();
        let admitted = self.accept_into(order, &mut corrections);
        Acceptance {
            admitted,
            corrections,
        }
    }

    /// Judge one order, appending corrections to `corrections`.
    ///
    /// Removals and non-aggregate orders are always admitted and never
    /// produce corrections.
    pub fn accept_into(&mut self, order: &Order, corrections: &mut Vec<Order>) -> bool {
        let Some(book) = self.books.get_mut(&order.symbol) else {
            return true;
        };
        if order.scope != Scope::Aggregate {
            return true;
        }
        if !order.has_size() {
            book.remove(&order.index);
            return true;
        }

        let keep_ttl = self.keep_ttl;
        let flip_ttl = self.flip_ttl;

        let outdated_by = book.values().find(|better| {
            let b = &better.order;
            (b.index != order.index && !better.tombstone && same_slot(b, order) && b.time > order.time)
                || b.time > order.time.saturating_add(keep_ttl)
                || (bid_ask_flip(b, order) && b.time > order.time.saturating_add(flip_ttl))
        });
        if let Some(better) = outdated_by {
            debug!(order = %order, better = %better.order, "aggregate quote outdated on arrival");
            if let Some(old) = book.insert(order.index, Tracked::dead(order)) {
                if !old.tombstone {
                    corrections.push(order.resized(0));
                }
            }
            return false;
        }

        if let Some(old) = book.get(&order.index) {
            if old.tombstone
                && old.order.side == order.side
                && old.order.price == order.price
                && old.order.time >= order.time
            {
                debug!(order = %order, "stale repeat of a rejected quote");
                return false;
            }
        }

        let keep_cutoff = order.time.checked_sub(keep_ttl);
        let flip_cutoff = order.time.checked_sub(flip_ttl);
        for (&index, worse) in book.iter_mut() {
            if index == order.index || worse.tombstone {
                continue;
            }
            let w = &worse.order;
            let outdated = (same_slot(w, order) && w.time <= order.time)
                || keep_cutoff.is_some_and(|cutoff| w.time <= cutoff)
                || (bid_ask_flip(w, order) && flip_cutoff.is_some_and(|cutoff| w.time <= cutoff));
            if outdated {
                debug!(order = %w, by = %order, "correcting outdated aggregate quote");
                worse.tombstone = true;
                corrections.push(w.resized(0));
            }
        }

        book.insert(order.index, Tracked::live(order));
        true
    }

    /// Filter a batch. Corrections are placed right before the order that
    /// caused them; rejected orders are left out.
    pub fn process_events(&mut self, events: &[Order]) -> Vec<Order> {
        let mut filtered = Vec::with_capacity(events.len() + 10);
        for order in events {
            if self.accept_into(order, &mut filtered) {
                filtered.push(order.clone());
            }
        }
        filtered
    }
}

/// Same side and same price.
fn same_slot(a: &Order, b: &Order) -> bool {
    a.side == b.side && a.price == b.price
}

/// Opposite sides with the bid at or above the offer.
fn bid_ask_flip(a: &Order, b: &Order) -> bool {
    match (a.side, b.side) {
        (Side::Buy, Side::Sell) => a.price >= b.price,
        (Side::Sell, Side::Buy) => b.price >= a.price,
        _ => false,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Unit Tests
// ============================================================================
