//! Scope override index: one side of the book.
//!
//! ## Precedence
//!
//! A more detailed quote hides the less detailed one it refines:
//!
//! ```text
//! Order[ex, mm]  hides  Aggregate[ex, mm]
//! Aggregate[ex]  hides  Regional[ex]
//! Regional       hides  Composite
//! ```
//!
//! When the hiding quote goes away, the next one down resurfaces.
//!
//! ## State
//!
//! - the tracked composite node
//! - one tracked regional node per exchange code
//! - per exchange, a cell per market maker holding the tracked aggregate
//!   node and the number of checked individual orders
//! - the number of checked non-composite nodes on the whole side
//!
//! Composite visibility depends on that side-wide counter, not on the
//! exchange of the regional quote: one regional anywhere keeps the
//! composite hidden.
//!
//! ## Example
//!
//! ```
//! use orderbook_model::orderbook::ScopeOverrideIndex;
//! use orderbook_model::types::{Order, Scope, Side};
//!
//! let mut book = ScopeOverrideIndex::new(Side::Buy);
//! let composite = book.allocate(Order::new("IBM", 1, Side::Buy, Scope::Composite, 100, 5));
//! let regional = book
//!     .allocate(Order::new("IBM", 2, Side::Buy, Scope::Regional, 100, 3).with_exchange(b'N'));
//!
//! book.insert_order_node(composite).unwrap();
//! book.insert_order_node(regional).unwrap();
//! assert_eq!(book.len(), 1);
//! assert_eq!(book.get(0).map(|o| o.index), Some(2));
//!
//! book.delete_order_node(regional);
//! assert_eq!(book.get(0).map(|o| o.index), Some(1));
//! ```

use std::collections::HashMap;

use tracing::trace;

use crate::error::{BookError, Result};
use crate::orderbook::comparator;
use crate::tree::{CheckedTree, Cursor, Iter, NodeId};
use crate::types::{Order, Scope, ScopeFilter, Side, EXCHANGE_COUNT};

/// Tracked quotes of one market maker on one exchange.
#[derive(Debug, Clone, Default)]
struct MarketMakerCell {
    /// Aggregate quote of this market maker
    aggregate: Option<NodeId>,

    /// Checked individual orders of this market maker
    order_count: usize,
}

impl MarketMakerCell {
    fn is_empty(&self) -> bool {
        self.aggregate.is_none() && self.order_count == 0
    }
}

/// One side of the order book with scope override applied.
pub struct ScopeOverrideIndex {
    side: Side,

    tree: CheckedTree<Order>,

    filter: ScopeFilter,

    composite: Option<NodeId>,

    /// Checked nodes of any scope but composite
    non_composite_count: usize,

    /// Indexed by exchange code
    regionals: Vec<Option<NodeId>>,

    /// Indexed by exchange code, keyed by market maker
    aggregates: Vec<HashMap<String, MarketMakerCell>>,

    /// Set by every mutation since `begin_change`
    changed: bool,
}

impl ScopeOverrideIndex {
    /// Create an empty side showing every scope.
    pub fn new(side: Side) -> Self {
        Self::with_capacity(side, 0)
    }

    /// Create an empty side with room for `capacity` orders.
    pub fn with_capacity(side: Side, capacity: usize) -> Self {
        Self {
            side,
            tree: CheckedTree::with_capacity(comparator::for_side(side), capacity),
            filter: ScopeFilter::ALL,
            composite: None,
            non_composite_count: 0,
            regionals: vec![None; EXCHANGE_COUNT],
            aggregates: (0..EXCHANGE_COUNT).map(|_| HashMap::new()).collect(),
            changed: false,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn filter(&self) -> ScopeFilter {
        self.filter
    }

    /// Replace the filter. Nodes already admitted keep their state until
    /// they are reinserted.
    pub fn set_filter(&mut self, filter: ScopeFilter) {
        self.filter = filter;
    }

    /// Underlying tree, for diagnostics.
    pub fn tree(&self) -> &CheckedTree<Order> {
        &self.tree
    }

    // ========================================================================
    // Visible list
    // ========================================================================

    /// Number of visible orders.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Visible order at `rank`, best first.
    pub fn get(&self, rank: usize) -> Option<&Order> {
        self.tree.get(rank)
    }

    /// Visible orders, best first.
    pub fn iter(&self) -> Iter<'_, Order> {
        self.tree.iter()
    }

    pub fn cursor(&self) -> Cursor {
        self.tree.cursor()
    }

    /// Rank of a node among visible orders.
    pub fn rank_of(&self, id: NodeId) -> Option<usize> {
        self.tree.rank_of(id)
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.tree.is_checked(id)
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Allocate a detached node for `order`.
    pub fn allocate(&mut self, order: Order) -> NodeId {
        self.tree.allocate(order)
    }

    /// Delete the node if needed and free it.
    pub fn release(&mut self, id: NodeId) -> Option<Order> {
        self.delete_order_node(id);
        self.tree.release(id)
    }

    pub fn value(&self, id: NodeId) -> Option<&Order> {
        self.tree.value(id)
    }

    /// Replace the order of a detached node. Returns `false` for linked or
    /// unknown nodes.
    pub fn set_value(&mut self, id: NodeId, order: Order) -> bool {
        match self.tree.value_mut(id) {
            Some(slot) => {
                *slot = order;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.tree.contains(id)
    }

    // ========================================================================
    // Book mutations
    // ========================================================================

    /// Link a node, show it if its scope wins and hide whatever it
    /// overrides.
    pub fn insert_order_node(&mut self, id: NodeId) -> Result<()> {
        self.tree.insert(id)?;
        if let Some(hidden) = self.admit(id) {
            if self.tree.uncheck(hidden) && !self.is_composite(hidden) {
                self.non_composite_count -= 1;
            }
            trace!(side = ?self.side, node = id, hidden, "scope override");
        }
        self.changed = true;
        #[cfg(feature = "validate-tree")]
        self.assert_valid();
        Ok(())
    }

    /// Unlink a node and let whatever it was hiding resurface.
    /// No-op for nodes that are not linked.
    pub fn delete_order_node(&mut self, id: NodeId) {
        if !self.tree.contains(id) {
            return;
        }
        let revealed = self.dismiss(id);
        self.tree.delete(id);
        if let Some(revealed) = revealed {
            if self.tree.check(revealed) && !self.is_composite(revealed) {
                self.non_composite_count += 1;
            }
            trace!(side = ?self.side, node = id, revealed, "scope override lifted");
        }
        self.changed = true;
        #[cfg(feature = "validate-tree")]
        self.assert_valid();
    }

    /// Reinsert a node, picking up a changed value.
    pub fn update_order_node(&mut self, id: NodeId) -> Result<()> {
        self.delete_order_node(id);
        self.insert_order_node(id)
    }

    /// Forget every node and every scope table entry. Allocations survive.
    pub fn clear(&mut self) {
        self.changed |= self.tree.tree_len() > 0;
        self.clear_scopes();
        self.tree.clear();
    }

    /// Reset the change flag.
    pub fn begin_change(&mut self) {
        self.changed = false;
    }

    /// Whether anything changed since `begin_change`.
    pub fn end_change(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    // ========================================================================
    // Scope override
    // ========================================================================

    /// Check a freshly linked node if its scope wins, and return the node
    /// it overrides, which the caller must uncheck.
    pub fn admit(&mut self, id: NodeId) -> Option<NodeId> {
        let order = self.tree.value(id)?;
        let scope = order.scope;
        if !self.filter.allows(scope) {
            return None;
        }
        if scope == Scope::Composite {
            self.composite = Some(id);
            if self.non_composite_count == 0 {
                self.tree.check(id);
            }
            return None;
        }

        let ex = exchange_slot(order)?;
        if scope == Scope::Regional {
            self.regionals[ex] = Some(id);
            if self.aggregates[ex].is_empty() {
                self.check_counted(id);
            }
            return self.composite;
        }

        let cell = self.aggregates[ex]
            .entry(order.market_maker.clone())
            .or_default();
        let fallback = self.regionals[ex].or(self.composite);
        let (show, hidden) = if scope == Scope::Aggregate {
            cell.aggregate = Some(id);
            (cell.order_count == 0, fallback)
        } else {
            cell.order_count += 1;
            (true, cell.aggregate.or(fallback))
        };
        if show {
            self.check_counted(id);
        }
        hidden
    }

    /// Uncheck a node about to be unlinked, and return the node that must
    /// be checked in its place.
    pub fn dismiss(&mut self, id: NodeId) -> Option<NodeId> {
        let was_checked = self.tree.uncheck(id);
        let order = self.tree.value(id)?;
        let scope = order.scope;
        if scope == Scope::Composite {
            if self.composite == Some(id) {
                self.composite = None;
            }
            return None;
        }
        if was_checked {
            debug_assert!(self.non_composite_count > 0);
            self.non_composite_count = self.non_composite_count.saturating_sub(1);
        }

        let ex = exchange_slot(order)?;
        let composite = if self.non_composite_count == 0 { self.composite } else { None };
        if scope == Scope::Regional {
            if self.regionals[ex] == Some(id) {
                self.regionals[ex] = None;
            }
            return if was_checked { composite } else { None };
        }

        let regional = self.regionals[ex];
        let cells = &mut self.aggregates[ex];
        let market_maker = order.market_maker.as_str();
        let cell = cells.get_mut(market_maker)?;
        let revealed = if scope == Scope::Aggregate {
            if cell.aggregate == Some(id) {
                cell.aggregate = None;
            }
            regional.or(composite)
        } else {
            if was_checked {
                cell.order_count -= 1;
            }
            if cell.order_count > 0 {
                None
            } else {
                cell.aggregate.or(regional).or(composite)
            }
        };
        if cell.is_empty() {
            cells.remove(market_maker);
        }
        if was_checked {
            revealed
        } else {
            None
        }
    }

    fn check_counted(&mut self, id: NodeId) {
        if self.tree.check(id) {
            self.non_composite_count += 1;
        }
    }

    fn is_composite(&self, id: NodeId) -> bool {
        self.tree.value(id).is_some_and(|order| order.scope == Scope::Composite)
    }

    fn clear_scopes(&mut self) {
        self.composite = None;
        self.non_composite_count = 0;
        self.regionals.fill(None);
        for cells in &mut self.aggregates {
            cells.clear();
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate the tree and cross-check the scope tables against it.
    pub fn validate(&self) -> Result<()> {
        self.tree.validate()?;

        let mut non_composite = 0;
        let mut individual = 0;
        for order in self.tree.iter() {
            if order.side != self.side {
                return Err(BookError::violation(format!(
                    "{:?} order {} on the {:?} side",
                    order.side, order.index, self.side
                )));
            }
            if order.scope != Scope::Composite {
                non_composite += 1;
            }
            if order.scope == Scope::Order {
                individual += 1;
            }
        }
        if non_composite != self.non_composite_count {
            return Err(BookError::violation(format!(
                "{non_composite} visible non-composite orders, counter says {}",
                self.non_composite_count
            )));
        }

        let counted: usize = self
            .aggregates
            .iter()
            .flat_map(|cells| cells.values())
            .map(|cell| cell.order_count)
            .sum();
        if counted != individual {
            return Err(BookError::violation(format!(
                "{individual} visible individual orders, cells count {counted}"
            )));
        }

        let tracked = self
            .composite
            .into_iter()
            .chain(self.regionals.iter().flatten().copied())
            .chain(self.aggregates.iter().flat_map(|cells| cells.values()).filter_map(|c| c.aggregate));
        for id in tracked {
            if !self.tree.contains(id) {
                return Err(BookError::violation(format!("scope table holds unlinked node {id}")));
            }
        }
        Ok(())
    }

    #[cfg(feature = "validate-tree")]
    fn assert_valid(&self) {
        if let Err(err) = self.validate() {
            panic!("{:?} book corrupted: {err}", self.side);
        }
    }
}

impl std::fmt::Debug for ScopeOverrideIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeOverrideIndex")
            .field("side", &self.side)
            .field("filter", &self.filter)
            .field("visible", &self.tree.len())
            .field("linked", &self.tree.tree_len())
            .field("non_composite_count", &self.non_composite_count)
            .finish()
    }
}

fn exchange_slot(order: &Order) -> Option<usize> {
    order.has_valid_exchange().then(|| usize::from(order.exchange_code))
}

// ============================================================================
// Unit Tests
// ============================================================================
