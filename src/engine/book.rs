//! Order book engine: one symbol, both sides, one notification per
//! transaction.
//!
//! ## Flow of an order
//!
//! 1. The previous version of the index (if any) is unlinked from its side
//!    and withdrawn from the corrector.
//! 2. The corrector, when enabled, judges the order. Corrections it emits
//!    unlink the orders they name.
//! 3. The order is kept when it has a size or is a composite quote. Kept
//!    orders are stored raw in the identity map; the tree holds a copy with
//!    the lot size applied.
//! 4. Admitted orders are linked into their side, where scope override
//!    decides what is visible.
//!
//! ## Example
//!
//! ```
//! use orderbook_model::engine::OrderBookEngine;
//! use orderbook_model::types::{Order, Scope, Side};
//!
//! let mut engine = OrderBookEngine::for_symbol("IBM");
//! engine.transaction(|book| -> orderbook_model::Result<()> {
//!     book.upsert(Order::new("IBM", 1, Side::Buy, Scope::Composite, 10, 5))?;
//!     book.upsert(Order::new("IBM", 2, Side::Buy, Scope::Regional, 10, 5).with_exchange(b'N'))?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! let visible: Vec<u64> = engine.visible_orders(Side::Buy).map(|o| o.index).collect();
//! assert_eq!(visible, vec![2]);
//! assert_eq!(engine.version(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::BookConfig;
use crate::corrector::{OrderBookCorrector, DEFAULT_FLIP_TTL, DEFAULT_KEEP_TTL};
use crate::engine::notify::{BookListener, EngineId, Executor, Notifier};
use crate::error::{BookError, Result};
use crate::feed::{OrderEvent, ReleasedBatch, TransactionAssembler};
use crate::orderbook::ScopeOverrideIndex;
use crate::tree::{Cursor, Iter, NodeId};
use crate::types::price::apply_lot;
use crate::types::{BookDigest, Order, Scope, ScopeFilter, Side};

/// Bits of the index below the source id.
const SOURCE_SHIFT: u32 = 48;

/// Windows used by the corrector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionSettings {
    pub keep_ttl: Duration,
    pub flip_ttl: Duration,
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            keep_ttl: DEFAULT_KEEP_TTL,
            flip_ttl: DEFAULT_FLIP_TTL,
        }
    }
}

/// What the engine knows about one index.
#[derive(Debug, Clone)]
struct Entry {
    /// As received, before lot scaling
    order: Order,

    /// Node in the book of `order.side`
    node: NodeId,

    /// Admitted by the corrector; only admitted entries are linked
    accepted: bool,
}

/// Order book of one symbol.
pub struct OrderBookEngine {
    id: EngineId,

    symbol: Option<String>,

    buy: ScopeOverrideIndex,

    sell: ScopeOverrideIndex,

    /// Keyed by order index
    entries: BTreeMap<u64, Entry>,

    lot_size: u32,

    size_limit: Option<usize>,

    correction: Option<CorrectionSettings>,

    corrector: Option<OrderBookCorrector>,

    /// Scratch buffer for corrector output
    corrections: Vec<Order>,

    assembler: TransactionAssembler,

    notifier: Notifier,

    in_transaction: bool,

    /// Number of notifications fired
    version: u64,

    closed: bool,
}

impl Default for OrderBookEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookEngine {
    /// Engine with no symbol. It ignores every order until
    /// [`set_symbol`](Self::set_symbol) is called.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Engine with no symbol and room for `capacity` orders per side.
    pub fn with_capacity(capacity: usize) -> Self {
        let id = EngineId::next();
        Self {
            id,
            symbol: None,
            buy: ScopeOverrideIndex::with_capacity(Side::Buy, capacity),
            sell: ScopeOverrideIndex::with_capacity(Side::Sell, capacity),
            entries: BTreeMap::new(),
            lot_size: 1,
            size_limit: None,
            correction: None,
            corrector: None,
            corrections: Vec::new(),
            assembler: TransactionAssembler::new(),
            notifier: Notifier::new(id),
            in_transaction: false,
            version: 0,
            closed: false,
        }
    }

    /// Engine subscribed to `symbol`.
    pub fn for_symbol(symbol: &str) -> Self {
        let mut engine = Self::new();
        engine.set_symbol(Some(symbol));
        engine
    }

    /// Engine set up from configuration.
    pub fn from_config(config: &BookConfig) -> Result<Self> {
        config.validate()?;
        let mut engine = Self::new();
        engine.set_filter(config.filter)?;
        engine.set_lot_size(config.lot_size)?;
        engine.set_correction(config.correction());
        engine.set_size_limit(config.size_limit);
        engine.set_symbol(config.symbol.as_deref());
        Ok(engine)
    }

    #[inline]
    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Number of change notifications fired so far.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn filter(&self) -> ScopeFilter {
        self.buy.filter()
    }

    pub fn lot_size(&self) -> u32 {
        self.lot_size
    }

    pub fn size_limit(&self) -> Option<usize> {
        self.size_limit
    }

    pub fn correction(&self) -> Option<CorrectionSettings> {
        self.correction
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Switch to another symbol, or to none. The book is emptied (one
    /// notification if it held anything) and the corrector starts over.
    pub fn set_symbol(&mut self, symbol: Option<&str>) {
        if self.closed || self.symbol.as_deref() == symbol {
            return;
        }
        info!(engine = %self.id, from = ?self.symbol, to = ?symbol, "symbol changed");
        self.symbol = symbol.map(str::to_owned);
        self.with_transaction(|engine| engine.release_all());
        self.assembler.clear();
        self.rebuild_corrector();
    }

    /// Show only the scopes `filter` allows. Every tracked order is
    /// reapplied under one notification.
    pub fn set_filter(&mut self, filter: ScopeFilter) -> Result<()> {
        if filter.is_empty() {
            return Err(BookError::invalid("filter allows no scope"));
        }
        if filter == self.filter() {
            return Ok(());
        }
        debug!(engine = %self.id, %filter, "filter changed");
        self.buy.set_filter(filter);
        self.sell.set_filter(filter);
        self.with_transaction(Self::reapply)
    }

    /// Multiply sizes of composite, regional and aggregate quotes by
    /// `lot_size`. Every tracked order is reapplied under one notification.
    pub fn set_lot_size(&mut self, lot_size: u32) -> Result<()> {
        if lot_size == 0 {
            return Err(BookError::invalid("lot size must be at least 1"));
        }
        if lot_size == self.lot_size {
            return Ok(());
        }
        debug!(engine = %self.id, lot_size, "lot size changed");
        self.lot_size = lot_size;
        self.with_transaction(Self::reapply)
    }

    /// Enable the corrector with the given windows, or disable it.
    ///
    /// The corrector starts with no history either way, so every tracked
    /// order is admitted again and reapplied.
    pub fn set_correction(&mut self, correction: Option<CorrectionSettings>) {
        if self.closed || correction == self.correction {
            return;
        }
        debug!(engine = %self.id, ?correction, "correction changed");
        self.correction = correction;
        self.rebuild_corrector();
        for entry in self.entries.values_mut() {
            entry.accepted = true;
        }
        if let Err(err) = self.with_transaction(Self::reapply) {
            warn!(engine = %self.id, %err, "reapply after correction change failed");
        }
    }

    /// Keep at most `limit` orders; the lowest indices go first. Enforced
    /// at the end of every transaction.
    pub fn set_size_limit(&mut self, limit: Option<usize>) {
        self.size_limit = limit;
        self.with_transaction(|_| ());
    }

    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.notifier.set_executor(executor);
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn BookListener>) -> Result<()> {
        self.notifier.add_listener(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn BookListener>) -> bool {
        self.notifier.remove_listener(listener)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Start collecting changes. Transactions do not nest.
    pub fn begin_transaction(&mut self) {
        if self.in_transaction {
            warn!(engine = %self.id, "transaction already open");
            return;
        }
        self.in_transaction = true;
        self.buy.begin_change();
        self.sell.begin_change();
    }

    /// Close the transaction, firing one notification if anything visible
    /// may have changed. Returns whether it fired.
    pub fn end_transaction(&mut self) -> bool {
        if !self.in_transaction {
            warn!(engine = %self.id, "no transaction open");
            return false;
        }
        self.enforce_size_limit();
        self.in_transaction = false;
        let changed = self.buy.end_change() | self.sell.end_change();
        if changed && !self.closed {
            self.version += 1;
            trace!(engine = %self.id, version = self.version, "book changed");
            self.notifier.notify();
        }
        changed
    }

    /// Run `f` inside one transaction.
    pub fn transaction<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.with_transaction(f)
    }

    /// Joins the open transaction, if any.
    fn with_transaction<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let outer = self.in_transaction;
        if !outer {
            self.begin_transaction();
        }
        let result = f(self);
        if !outer {
            self.end_transaction();
        }
        result
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add, replace or remove (zero size) one order. Orders of another
    /// symbol are ignored.
    pub fn upsert(&mut self, order: Order) -> Result<()> {
        if !self.accepts_symbol(&order) {
            return Ok(());
        }
        check_exchange(&order)?;
        self.with_transaction(|engine| engine.apply(order))
    }

    /// Remove an order by index; returns whether it was known.
    pub fn remove(&mut self, index: u64) -> bool {
        if self.closed {
            return false;
        }
        self.with_transaction(|engine| engine.apply_removal(index))
    }

    /// Empty the book and forget the corrector history.
    pub fn clear(&mut self) {
        if self.closed {
            return;
        }
        self.with_transaction(|engine| engine.release_all());
        self.assembler.clear();
        self.rebuild_corrector();
    }

    /// Feed raw stream events. Events of unfinished transactions and
    /// snapshots are held back; everything released is applied under one
    /// notification. Returns whether a notification fired.
    pub fn process_events<I>(&mut self, events: I) -> Result<bool>
    where
        I: IntoIterator<Item = OrderEvent>,
    {
        if self.closed {
            return Ok(false);
        }
        let version = self.version;
        self.with_transaction(|engine| -> Result<()> {
            for event in events {
                if !engine.accepts_symbol(&event.order) {
                    continue;
                }
                if let Some(batch) = engine.assembler.push(event) {
                    engine.apply_batch(batch)?;
                }
            }
            Ok(())
        })?;
        Ok(self.version != version)
    }

    /// Drop listeners and all state. Later calls are ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        info!(engine = %self.id, "closed");
        self.closed = true;
        self.notifier.close();
        self.release_all();
        self.assembler.clear();
        if let Some(corrector) = self.corrector.as_mut() {
            corrector.close();
        }
        self.corrector = None;
    }

    fn accepts_symbol(&self, order: &Order) -> bool {
        if self.closed {
            return false;
        }
        let accepted = self.symbol.as_deref() == Some(order.symbol.as_str());
        if !accepted {
            trace!(engine = %self.id, symbol = %order.symbol, "order for another symbol ignored");
        }
        accepted
    }

    fn apply_batch(&mut self, batch: ReleasedBatch) -> Result<()> {
        if batch.snapshot {
            let first = u64::from(batch.source) << SOURCE_SHIFT;
            let last = first | ((1 << SOURCE_SHIFT) - 1);
            let stale: Vec<u64> = self.entries.range(first..=last).map(|(&index, _)| index).collect();
            debug!(engine = %self.id, source = batch.source, dropped = stale.len(), "applying snapshot");
            for index in stale {
                self.apply_removal(index);
            }
        }
        for event in batch.events {
            if event.is_removal() {
                self.apply_removal(event.order.index);
                continue;
            }
            if let Err(err) = check_exchange(&event.order) {
                warn!(engine = %self.id, order = %event.order, %err, "event skipped");
                continue;
            }
            self.apply(event.order)?;
        }
        Ok(())
    }

    fn apply(&mut self, order: Order) -> Result<()> {
        if let Some((side, node, previous)) = self
            .entries
            .get(&order.index)
            .map(|entry| (entry.order.side, entry.node, entry.order.resized(0)))
        {
            if let Some(corrector) = self.corrector.as_mut() {
                corrector.accept(&previous);
            }
            self.side_mut(side).delete_order_node(node);
        }

        let accepted = self.run_corrector(&order);
        if !order.has_size() && order.scope != Scope::Composite {
            self.release_entry(order.index);
            return Ok(());
        }

        let scaled = self.scaled(&order);
        let side = order.side;
        let index = order.index;
        let existing = self.entries.get(&index).map(|entry| (entry.order.side, entry.node));
        let node = match existing {
            Some((old_side, node)) if old_side == side => {
                self.side_mut(side).set_value(node, scaled);
                node
            }
            Some((old_side, node)) => {
                trace!(engine = %self.id, index, "order moved to the other side");
                self.side_mut(old_side).release(node);
                self.side_mut(side).allocate(scaled)
            }
            None => self.side_mut(side).allocate(scaled),
        };
        self.entries.insert(index, Entry { order, node, accepted });

        if accepted {
            if let Err(err) = self.side_mut(side).insert_order_node(node) {
                warn!(engine = %self.id, index, %err, "order not linked");
                if let Some(entry) = self.entries.get_mut(&index) {
                    entry.accepted = false;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_removal(&mut self, index: u64) -> bool {
        let Some(previous) = self.entries.get(&index).map(|entry| entry.order.resized(0)) else {
            return false;
        };
        if let Some(corrector) = self.corrector.as_mut() {
            corrector.accept(&previous);
        }
        self.release_entry(index)
    }

    /// Judge `order`, unlinking whatever it makes stale. Returns whether
    /// `order` is admitted.
    fn run_corrector(&mut self, order: &Order) -> bool {
        let Some(corrector) = self.corrector.as_mut() else {
            return true;
        };
        let mut corrections = std::mem::take(&mut self.corrections);
        let admitted = corrector.accept_into(order, &mut corrections);
        for correction in corrections.drain(..) {
            self.withdraw(correction.index);
        }
        self.corrections = corrections;
        admitted
    }

    /// Unlink an entry without forgetting it.
    fn withdraw(&mut self, index: u64) {
        let Some(entry) = self.entries.get_mut(&index) else {
            return;
        };
        if !entry.accepted {
            return;
        }
        entry.accepted = false;
        let (side, node) = (entry.order.side, entry.node);
        debug!(engine = %self.id, index, "order corrected away");
        self.side_mut(side).delete_order_node(node);
    }

    fn release_entry(&mut self, index: u64) -> bool {
        match self.entries.remove(&index) {
            Some(entry) => {
                self.side_mut(entry.order.side).release(entry.node);
                true
            }
            None => false,
        }
    }

    fn release_all(&mut self) {
        self.buy.clear();
        self.sell.clear();
        for entry in std::mem::take(&mut self.entries).into_values() {
            self.side_mut(entry.order.side).release(entry.node);
        }
    }

    /// Relink every admitted entry under the current lot size and filter.
    fn reapply(&mut self) -> Result<()> {
        self.buy.clear();
        self.sell.clear();
        let lot_size = self.lot_size;
        for entry in self.entries.values() {
            let book = match entry.order.side {
                Side::Buy => &mut self.buy,
                Side::Sell => &mut self.sell,
            };
            book.set_value(entry.node, scale(&entry.order, lot_size));
            if entry.accepted {
                book.insert_order_node(entry.node)?;
            }
        }
        Ok(())
    }

    fn enforce_size_limit(&mut self) {
        let Some(limit) = self.size_limit else {
            return;
        };
        while self.entries.len() > limit {
            let Some((index, entry)) = self.entries.pop_first() else {
                break;
            };
            trace!(engine = %self.id, index, "evicted by size limit");
            if let Some(corrector) = self.corrector.as_mut() {
                corrector.accept(&entry.order.resized(0));
            }
            self.side_mut(entry.order.side).release(entry.node);
        }
    }

    fn rebuild_corrector(&mut self) {
        self.corrector = match (self.correction, &self.symbol) {
            (Some(settings), Some(symbol)) => {
                let mut corrector = OrderBookCorrector::with_ttl(settings.keep_ttl, settings.flip_ttl);
                corrector.set_symbols([symbol.as_str()]);
                Some(corrector)
            }
            _ => None,
        };
    }

    fn scaled(&self, order: &Order) -> Order {
        scale(order, self.lot_size)
    }

    fn side_mut(&mut self, side: Side) -> &mut ScopeOverrideIndex {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// One side of the book.
    pub fn book(&self, side: Side) -> &ScopeOverrideIndex {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    /// Visible orders of `side`, best first, lot size applied.
    pub fn visible_orders(&self, side: Side) -> Iter<'_, Order> {
        self.book(side).iter()
    }

    /// Visible order of `side` at `rank`.
    pub fn order_at(&self, side: Side, rank: usize) -> Option<&Order> {
        self.book(side).get(rank)
    }

    /// Rank of an order among the visible orders of its side.
    pub fn rank_of(&self, index: u64) -> Option<usize> {
        let entry = self.entries.get(&index)?;
        self.book(entry.order.side).rank_of(entry.node)
    }

    /// Number of visible orders on `side`.
    pub fn len(&self, side: Side) -> usize {
        self.book(side).len()
    }

    /// Whether both sides show nothing.
    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }

    /// Order as received (no lot size), visible or not.
    pub fn order(&self, index: u64) -> Option<&Order> {
        self.entries.get(&index).map(|entry| &entry.order)
    }

    /// Whether the corrector admitted the order at `index`.
    pub fn is_accepted(&self, index: u64) -> bool {
        self.entries.get(&index).is_some_and(|entry| entry.accepted)
    }

    /// Number of tracked orders, visible or not.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Fail-fast cursor over the visible orders of `side`.
    pub fn cursor(&self, side: Side) -> Cursor {
        self.book(side).cursor()
    }

    /// Fingerprint of the visible book.
    pub fn snapshot_digest(&self) -> BookDigest {
        BookDigest::compute(self.version, self.buy.iter(), self.sell.iter())
    }

    /// Validate both sides and the identity map against them.
    pub fn validate(&self) -> Result<()> {
        self.buy.validate()?;
        self.sell.validate()?;
        for (&index, entry) in &self.entries {
            let book = self.book(entry.order.side);
            if book.contains(entry.node) != entry.accepted {
                return Err(BookError::violation(format!(
                    "order {index}: linked={} accepted={}",
                    book.contains(entry.node),
                    entry.accepted
                )));
            }
            if book.value(entry.node).map(|o| o.index) != Some(index) {
                return Err(BookError::violation(format!("order {index} points at a foreign node")));
            }
        }
        let allocated = self.buy.tree().allocated() + self.sell.tree().allocated();
        if allocated != self.entries.len() {
            return Err(BookError::violation(format!(
                "{allocated} nodes allocated for {} orders",
                self.entries.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for OrderBookEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBookEngine")
            .field("id", &self.id)
            .field("symbol", &self.symbol)
            .field("buy", &self.buy)
            .field("sell", &self.sell)
            .field("entries", &self.entries.len())
            .field("lot_size", &self.lot_size)
            .field("version", &self.version)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Copy of `order` with the lot size applied. Individual orders keep their
/// size.
fn scale(order: &Order, lot_size: u32) -> Order {
    if order.scope == Scope::Order || lot_size == 1 {
        order.clone()
    } else {
        order.resized(apply_lot(order.size, lot_size))
    }
}

fn check_exchange(order: &Order) -> Result<()> {
    if order.scope != Scope::Composite && !order.has_valid_exchange() {
        return Err(BookError::invalid(format!(
            "exchange code {} of order {} is out of range",
            order.exchange_code, order.index
        )));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::notify::BookChange;
    use crate::feed::EventFlags;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SYMBOL: &str = "IBM";

    fn order(index: u64, side: Side, scope: Scope, price: u64, size: u64) -> Order {
        Order::new(SYMBOL, index, side, scope, price, size)
    }

    fn aggregate(index: u64, price: u64, size: u64, mm: &str) -> Order {
        order(index, Side::Buy, Scope::Aggregate, price, size)
            .with_exchange(b'N')
            .with_market_maker(mm)
    }

    fn individual(index: u64, side: Side, price: u64) -> Order {
        order(index, side, Scope::Order, price, 1)
            .with_exchange(b'N')
            .with_market_maker("MM")
    }

    fn visible(engine: &OrderBookEngine, side: Side) -> Vec<u64> {
        engine.visible_orders(side).map(|o| o.index).collect()
    }

    fn counted(engine: &OrderBookEngine) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        engine
            .add_listener(Arc::new(move |_: &BookChange| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        count
    }

    #[test]
    fn test_scopes_in_one_transaction() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        let notifications = counted(&engine);

        engine.begin_transaction();
        engine.upsert(order(1, Side::Buy, Scope::Composite, 10, 5)).unwrap();
        engine
            .upsert(order(2, Side::Buy, Scope::Regional, 10, 5).with_exchange(b'N'))
            .unwrap();
        engine.upsert(aggregate(3, 11, 5, "ABC")).unwrap();
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
        assert!(engine.end_transaction());

        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(visible(&engine, Side::Buy), vec![3]);
        assert_eq!(engine.entry_count(), 3);
        engine.validate().unwrap();
    }

    #[test]
    fn test_upsert_outside_transaction_notifies() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        let notifications = counted(&engine);
        engine.upsert(individual(1, Side::Sell, 100)).unwrap();
        engine.upsert(individual(2, Side::Sell, 99)).unwrap();
        assert_eq!(notifications.load(Ordering::SeqCst), 2);
        assert_eq!(engine.version(), 2);
        assert_eq!(visible(&engine, Side::Sell), vec![2, 1]);
        assert_eq!(engine.rank_of(1), Some(1));
        assert_eq!(engine.order_at(Side::Sell, 0).map(|o| o.index), Some(2));
    }

    #[test]
    fn test_empty_transaction_is_silent() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        let notifications = counted(&engine);
        engine.begin_transaction();
        assert!(!engine.end_transaction());
        assert!(!engine.remove(42));
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nested_begin_is_ignored() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        let notifications = counted(&engine);
        engine.begin_transaction();
        engine.begin_transaction();
        engine.upsert(individual(1, Side::Buy, 100)).unwrap();
        assert!(engine.end_transaction());
        assert!(!engine.end_transaction());
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_price_change_moves_order() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.upsert(individual(1, Side::Buy, 100)).unwrap();
        engine.upsert(individual(2, Side::Buy, 101)).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![2, 1]);

        engine.upsert(individual(1, Side::Buy, 102)).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![1, 2]);
        assert_eq!(engine.entry_count(), 2);
        engine.validate().unwrap();
    }

    #[test]
    fn test_side_change_moves_node() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.upsert(individual(1, Side::Buy, 100)).unwrap();
        engine.upsert(individual(1, Side::Sell, 100)).unwrap();
        assert!(engine.book(Side::Buy).is_empty());
        assert_eq!(visible(&engine, Side::Sell), vec![1]);
        assert_eq!(engine.book(Side::Buy).tree().allocated(), 0);
        engine.validate().unwrap();
    }

    #[test]
    fn test_zero_size_removes_except_composite() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.upsert(individual(1, Side::Buy, 100)).unwrap();
        engine.upsert(order(2, Side::Buy, Scope::Composite, 90, 3)).unwrap();

        engine.upsert(individual(1, Side::Buy, 100).with_size(0)).unwrap();
        assert_eq!(engine.order(1), None);

        engine.upsert(order(2, Side::Buy, Scope::Composite, 90, 0)).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![2]);
        assert_eq!(engine.order_at(Side::Buy, 0).map(|o| o.size), Some(0));

        assert!(engine.remove(2));
        assert!(engine.is_empty());
        engine.validate().unwrap();
    }

    #[test]
    fn test_other_symbol_ignored() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine
            .upsert(Order::new("MSFT", 1, Side::Buy, Scope::Composite, 1, 1))
            .unwrap();
        assert_eq!(engine.entry_count(), 0);

        let mut idle = OrderBookEngine::new();
        idle.upsert(order(1, Side::Buy, Scope::Composite, 1, 1)).unwrap();
        assert_eq!(idle.entry_count(), 0);
    }

    #[test]
    fn test_bad_exchange_rejected() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        let result = engine.upsert(order(1, Side::Buy, Scope::Regional, 1, 1).with_exchange(200));
        assert!(matches!(result, Err(BookError::InvalidArgument(_))));
        assert_eq!(engine.entry_count(), 0);
        assert_eq!(engine.version(), 0);
    }

    #[test]
    fn test_lot_size_reapply() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.upsert(aggregate(1, 100, 5, "AAA")).unwrap();
        engine
            .upsert(order(2, Side::Buy, Scope::Order, 100, 5).with_exchange(b'N').with_market_maker("BBB"))
            .unwrap();
        let notifications = counted(&engine);

        engine.set_lot_size(10).unwrap();
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        let sizes: Vec<(u64, u64)> = engine.visible_orders(Side::Buy).map(|o| (o.index, o.size)).collect();
        assert_eq!(sizes, vec![(1, 50), (2, 5)]);
        assert_eq!(engine.order(1).map(|o| o.size), Some(5), "raw order is kept");

        engine.set_lot_size(10).unwrap();
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert!(matches!(engine.set_lot_size(0), Err(BookError::InvalidArgument(_))));
        engine.validate().unwrap();
    }

    #[test]
    fn test_filter_reapply() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.transaction(|book| {
            book.upsert(order(1, Side::Buy, Scope::Composite, 10, 5)).unwrap();
            book.upsert(order(2, Side::Buy, Scope::Regional, 10, 5).with_exchange(b'N')).unwrap();
            book.upsert(aggregate(3, 11, 5, "ABC")).unwrap();
        });
        let notifications = counted(&engine);

        engine.set_filter(ScopeFilter::COMPOSITE_REGIONAL).unwrap();
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(visible(&engine, Side::Buy), vec![2]);

        engine.set_filter(ScopeFilter::COMPOSITE).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![1]);

        engine.set_filter(ScopeFilter::ALL).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![3]);
        assert!(matches!(
            engine.set_filter(ScopeFilter::from_scopes(&[])),
            Err(BookError::InvalidArgument(_))
        ));
        engine.validate().unwrap();
    }

    #[test]
    fn test_corrector_withdraws_stale_quote() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.set_correction(Some(CorrectionSettings::default()));

        engine.upsert(aggregate(1, 100, 5, "AAA").with_time(1_000, 0)).unwrap();
        engine.upsert(aggregate(2, 100, 5, "BBB").with_time(2_000, 0)).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![2]);
        assert!(!engine.is_accepted(1));
        assert!(engine.order(1).is_some());
        engine.validate().unwrap();

        // An older quote at the same price is rejected on arrival.
        engine.upsert(aggregate(3, 100, 9, "CCC").with_time(500, 0)).unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![2]);
        assert!(!engine.is_accepted(3));

        // Without correction everything tracked shows again.
        engine.set_correction(None);
        assert_eq!(visible(&engine, Side::Buy), vec![3, 1, 2]);
        engine.validate().unwrap();
    }

    #[test]
    fn test_symbol_change_clears_book() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.upsert(individual(1, Side::Buy, 100)).unwrap();
        let notifications = counted(&engine);

        engine.set_symbol(Some(SYMBOL));
        assert_eq!(notifications.load(Ordering::SeqCst), 0);

        engine.set_symbol(Some("MSFT"));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(engine.entry_count(), 0);
        assert_eq!(engine.symbol(), Some("MSFT"));
        engine.validate().unwrap();

        engine.set_symbol(None);
        assert_eq!(notifications.load(Ordering::SeqCst), 1, "nothing to clear");
    }

    #[test]
    fn test_size_limit_evicts_lowest_indices() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.set_size_limit(Some(2));
        engine.transaction(|book| {
            for index in 1..=3 {
                book.upsert(individual(index, Side::Buy, 100)).unwrap();
            }
        });
        assert_eq!(engine.entry_count(), 2);
        assert_eq!(visible(&engine, Side::Buy), vec![2, 3]);

        engine.set_size_limit(Some(1));
        assert_eq!(visible(&engine, Side::Buy), vec![3]);
        engine.validate().unwrap();
    }

    #[test]
    fn test_process_events_snapshot_replaces_source() {
        let source = |id: u64, index: u64| (id << SOURCE_SHIFT) | index;
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine
            .process_events([
                OrderEvent::new(individual(source(1, 1), Side::Buy, 100)),
                OrderEvent::new(individual(source(1, 2), Side::Buy, 100)),
                OrderEvent::new(individual(source(2, 1), Side::Buy, 100)),
            ])
            .unwrap();
        assert_eq!(engine.entry_count(), 3);
        let notifications = counted(&engine);

        let fired = engine
            .process_events([
                OrderEvent::new(individual(source(1, 3), Side::Buy, 100))
                    .with_flags(EventFlags::SNAPSHOT_BEGIN),
                OrderEvent::new(individual(source(1, 4), Side::Buy, 100))
                    .with_flags(EventFlags::SNAPSHOT_END),
            ])
            .unwrap();
        assert!(fired);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        let mut tracked: Vec<u64> = engine.visible_orders(Side::Buy).map(|o| o.index).collect();
        tracked.sort_unstable();
        assert_eq!(tracked, vec![source(1, 3), source(1, 4), source(2, 1)]);
        engine.validate().unwrap();
    }

    #[test]
    fn test_process_events_holds_pending_transaction() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        let fired = engine
            .process_events([OrderEvent::new(individual(1, Side::Buy, 100)).with_flags(EventFlags::TX_PENDING)])
            .unwrap();
        assert!(!fired);
        assert!(engine.is_empty());

        let fired = engine
            .process_events([
                OrderEvent::new(individual(2, Side::Buy, 100)),
                OrderEvent::removal(individual(1, Side::Buy, 100)),
            ])
            .unwrap();
        assert!(fired);
        assert_eq!(visible(&engine, Side::Buy), vec![2]);
    }

    #[test]
    fn test_process_events_skips_bad_exchange() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine
            .process_events([
                OrderEvent::new(order(1, Side::Buy, Scope::Regional, 1, 1).with_exchange(255)),
                OrderEvent::new(individual(2, Side::Buy, 100)),
            ])
            .unwrap();
        assert_eq!(visible(&engine, Side::Buy), vec![2]);
    }

    #[test]
    fn test_close_drops_everything() {
        let mut engine = OrderBookEngine::for_symbol(SYMBOL);
        engine.upsert(individual(1, Side::Buy, 100)).unwrap();
        let notifications = counted(&engine);
        engine.close();
        assert!(engine.is_closed());
        assert_eq!(engine.entry_count(), 0);

        engine.upsert(individual(2, Side::Buy, 100)).unwrap();
        assert_eq!(engine.entry_count(), 0);
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_digest_tracks_visible_book() {
        let mut a = OrderBookEngine::for_symbol(SYMBOL);
        let mut b = OrderBookEngine::for_symbol(SYMBOL);
        for engine in [&mut a, &mut b] {
            engine.upsert(individual(1, Side::Buy, 100)).unwrap();
            engine.upsert(individual(2, Side::Sell, 101)).unwrap();
        }
        assert_eq!(a.snapshot_digest(), b.snapshot_digest());

        b.upsert(individual(2, Side::Sell, 102)).unwrap();
        assert_ne!(a.snapshot_digest().state_root, b.snapshot_digest().state_root);
        assert_eq!(b.snapshot_digest().sell_count, 1);
    }

    #[test]
    fn test_from_config() {
        let config = BookConfig {
            symbol: Some(SYMBOL.to_string()),
            lot_size: 100,
            correct: true,
            ..BookConfig::default()
        };
        let engine = OrderBookEngine::from_config(&config).unwrap();
        assert_eq!(engine.symbol(), Some(SYMBOL));
        assert_eq!(engine.lot_size(), 100);
        assert_eq!(engine.correction(), Some(CorrectionSettings::default()));

        let broken = BookConfig {
            lot_size: 0,
            ..BookConfig::default()
        };
        assert!(OrderBookEngine::from_config(&broken).is_err());
    }
}
