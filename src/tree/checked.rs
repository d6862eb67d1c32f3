//! Checked tree: a red-black tree with order statistics over a subset.
//!
//! ## Overview
//!
//! Every node of the tree can be *checked* (visible) or not. Each node
//! keeps `child_count`, the number of checked nodes in its subtree
//! including itself, which gives O(log n) translation between a node and
//! its rank among checked nodes. Checking or unchecking a node touches only
//! the counts on its path to the root; no rotation happens.
//!
//! ## Storage
//!
//! Nodes live in a [`Slab`] owned by the tree and are addressed by
//! [`NodeId`]. Slot [`NIL`] holds the sentinel. Callers allocate a node
//! once and then insert, delete and reinsert it as its value changes, so
//! an external identity map can hold on to the `NodeId`.
//!
//! ## Complexity
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | insert / delete | O(log n) |
//! | check / uncheck | O(log n) |
//! | rank_of / node_at_rank | O(log n) |
//! | find / index_of | O(log n) |
//! | validate | O(n) |
//!
//! ## Example
//!
//! ```
//! use orderbook_model::tree::CheckedTree;
//!
//! let mut tree = CheckedTree::new(u32::cmp);
//! let a = tree.allocate(10);
//! let b = tree.allocate(20);
//! tree.insert(a).unwrap();
//! tree.insert(b).unwrap();
//!
//! tree.check(b);
//! assert_eq!(tree.len(), 1);
//! assert_eq!(tree.rank_of(b), Some(0));
//!
//! tree.check(a);
//! assert_eq!(tree.rank_of(b), Some(1));
//! assert_eq!(tree.get(0), Some(&10));
//! ```

use std::cmp::Ordering;
use std::mem;

use slab::Slab;
use tracing::trace;

use crate::error::{BookError, Result};
use crate::tree::iter::{Cursor, Iter, TreeIter};
use crate::tree::node::{Color, NodeId, TreeNode, NIL};

/// Total order over tree values. Equal values are rejected as duplicates.
pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// Sorted list of checked nodes backed by a red-black tree.
pub struct CheckedTree<T> {
    /// Node storage; slot `NIL` is the sentinel
    nodes: Slab<TreeNode<T>>,

    comparator: Comparator<T>,

    root: NodeId,

    /// Number of checked nodes
    size: usize,

    /// Number of nodes linked into the tree
    tree_size: usize,

    /// Bumped by every structural change and every check/uncheck
    mod_count: u64,
}

impl<T: Default> CheckedTree<T> {
    /// Create an empty tree ordered by `comparator`.
    pub fn new(comparator: Comparator<T>) -> Self {
        Self::with_capacity(comparator, 0)
    }

    /// Create an empty tree with room for `capacity` nodes.
    pub fn with_capacity(comparator: Comparator<T>, capacity: usize) -> Self {
        let mut nodes = Slab::with_capacity(capacity + 1);
        let nil = nodes.insert(TreeNode::sentinel(T::default()));
        debug_assert_eq!(nil, NIL);
        Self {
            nodes,
            comparator,
            root: NIL,
            size: 0,
            tree_size: 0,
            mod_count: 0,
        }
    }
}

impl<T> CheckedTree<T> {
    // ========================================================================
    // List API
    // ========================================================================

    /// Number of checked nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Value of the checked node at `rank`.
    pub fn get(&self, rank: usize) -> Option<&T> {
        self.node_at_rank(rank).map(|id| &self.nodes[id].value)
    }

    /// Rank of the checked node holding a value equal to `value`.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        let mut index = 0;
        let mut node = self.root;
        while node != NIL {
            match (self.comparator)(value, &self.nodes[node].value) {
                Ordering::Equal => {
                    let n = &self.nodes[node];
                    return n.checked.then(|| index + self.count(n.left));
                }
                Ordering::Less => node = self.left(node),
                Ordering::Greater => {
                    index += self.count(self.left(node)) + self.nodes[node].own_count();
                    node = self.right(node);
                }
            }
        }
        None
    }

    /// Iterate checked values in order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self, self.node_at_rank(0).unwrap_or(NIL), self.size)
    }

    /// Detached cursor over checked values that fails fast once the tree
    /// is modified.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.node_at_rank(0).unwrap_or(NIL), self.mod_count, true)
    }

    // ========================================================================
    // Tree API
    // ========================================================================

    /// Number of nodes linked into the tree, checked or not.
    #[inline]
    pub fn tree_len(&self) -> usize {
        self.tree_size
    }

    /// Number of allocated nodes, linked or detached.
    pub fn allocated(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Current modification counter.
    #[inline]
    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub fn comparator(&self) -> Comparator<T> {
        self.comparator
    }

    /// Iterate all linked values in order, checked or not.
    pub fn tree_iter(&self) -> TreeIter<'_, T> {
        TreeIter::new(self, self.first_node(), self.tree_size)
    }

    /// Detached cursor over all linked values.
    pub fn tree_cursor(&self) -> Cursor {
        Cursor::new(self.first_node(), self.mod_count, false)
    }

    /// Node by id; `None` for the sentinel and for unknown ids.
    pub fn node(&self, id: NodeId) -> Option<&TreeNode<T>> {
        if id == NIL {
            return None;
        }
        self.nodes.get(id)
    }

    pub fn value(&self, id: NodeId) -> Option<&T> {
        self.node(id).map(TreeNode::value)
    }

    /// Mutable access to the value of a detached node.
    ///
    /// Linked nodes are keyed by their value, so they are never handed out
    /// mutably.
    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut T> {
        if id == NIL {
            return None;
        }
        match self.nodes.get_mut(id) {
            Some(node) if node.is_removed() => Some(&mut node.value),
            _ => None,
        }
    }

    /// Whether `id` is linked into the tree.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| !node.is_removed())
    }

    /// Whether `id` is linked and checked.
    pub fn is_checked(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(TreeNode::is_checked)
    }

    /// Node holding a value equal to `value`, checked or not.
    pub fn find(&self, value: &T) -> Option<NodeId> {
        let mut node = self.root;
        while node != NIL {
            match (self.comparator)(value, &self.nodes[node].value) {
                Ordering::Equal => return Some(node),
                Ordering::Less => node = self.left(node),
                Ordering::Greater => node = self.right(node),
            }
        }
        None
    }

    /// Rank of a checked node among checked nodes; `None` if not checked.
    pub fn rank_of(&self, id: NodeId) -> Option<usize> {
        if !self.is_checked(id) {
            return None;
        }
        let mut index = self.count(self.left(id));
        let mut node = id;
        while node != self.root {
            let parent = self.parent(node);
            if self.right(parent) == node {
                index += self.count(self.left(parent)) + self.nodes[parent].own_count();
            }
            node = parent;
        }
        Some(index)
    }

    /// Checked node at `rank`.
    pub fn node_at_rank(&self, rank: usize) -> Option<NodeId> {
        if rank >= self.size {
            return None;
        }
        let mut index = rank;
        let mut node = self.root;
        while node != NIL {
            let left_count = self.count(self.left(node));
            if index == left_count && self.nodes[node].checked {
                return Some(node);
            } else if index < left_count {
                node = self.left(node);
            } else {
                index -= left_count + self.nodes[node].own_count();
                node = self.right(node);
            }
        }
        None
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Allocate a detached node holding `value`.
    pub fn allocate(&mut self, value: T) -> NodeId {
        self.nodes.insert(TreeNode::detached(value))
    }

    /// Free a node, deleting it from the tree first if needed.
    pub fn release(&mut self, id: NodeId) -> Option<T> {
        if id == NIL || !self.nodes.contains(id) {
            return None;
        }
        self.delete(id);
        Some(self.nodes.remove(id).value)
    }

    /// Link a detached node into the tree. The node starts unchecked.
    ///
    /// Fails with [`BookError::DuplicateKey`] when an equal value is
    /// already linked; the tree is left untouched in that case.
    pub fn insert(&mut self, id: NodeId) -> Result<()> {
        match self.node(id) {
            None => return Err(BookError::invalid(format!("unknown tree node {id}"))),
            Some(node) if !node.is_removed() => {
                return Err(BookError::DuplicateKey { node: id, existing: id })
            }
            Some(_) => {}
        }

        let mut parent = NIL;
        let mut node = self.root;
        let mut ord = Ordering::Equal;
        while node != NIL {
            parent = node;
            ord = (self.comparator)(&self.nodes[id].value, &self.nodes[node].value);
            match ord {
                Ordering::Equal => {
                    trace!(node = id, existing = node, "duplicate key on insert");
                    return Err(BookError::DuplicateKey { node: id, existing: node });
                }
                Ordering::Less => node = self.left(node),
                Ordering::Greater => node = self.right(node),
            }
        }

        {
            let n = &mut self.nodes[id];
            n.left = NIL;
            n.right = NIL;
            n.parent = parent;
            n.child_count = 0;
            n.checked = false;
            n.color = Color::Black;
        }
        self.mod_count += 1;
        self.tree_size += 1;

        if parent == NIL {
            self.root = id;
            return Ok(());
        }
        if ord == Ordering::Less {
            self.nodes[parent].left = id;
        } else {
            self.nodes[parent].right = id;
        }
        self.rebalance_after_insertion(id);
        Ok(())
    }

    /// Unlink a node from the tree. The node stays allocated and can be
    /// reinserted. Returns `false` if it was not linked.
    pub fn delete(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.mod_count += 1;
        self.tree_size -= 1;

        let p = id;
        if self.left(p) != NIL && self.right(p) != NIL {
            // Strictly internal: trade places with the in-order successor.
            // Counts are settled first so that p contributes nothing to
            // any ancestor once it sits in the successor's slot.
            let s = self.successor(p);
            if self.nodes[p].checked {
                let from = if self.nodes[s].checked { s } else { p };
                self.decrement_count(from);
            } else if self.nodes[s].checked {
                self.increment_count(p);
                self.decrement_count(s);
            }
            self.nodes[p].checked = false;
            self.swap_for_deletion(p, s);
        } else if self.nodes[p].checked {
            self.decrement_count(p);
            self.nodes[p].checked = false;
        }

        let replacement = if self.left(p) != NIL { self.left(p) } else { self.right(p) };
        if replacement != NIL {
            let parent = self.parent(p);
            self.nodes[replacement].parent = parent;
            self.relink(parent, p, replacement);
            let n = &mut self.nodes[p];
            n.left = NIL;
            n.right = NIL;
            n.parent = NIL;
            if n.color == Color::Black {
                self.rebalance_after_deletion(replacement);
            }
        } else if self.parent(p) == NIL {
            self.root = NIL;
        } else {
            // No children: p acts as its own phantom replacement.
            if self.nodes[p].color == Color::Black {
                self.rebalance_after_deletion(p);
            }
            let parent = self.parent(p);
            if parent != NIL {
                if self.left(parent) == p {
                    self.nodes[parent].left = NIL;
                } else if self.right(parent) == p {
                    self.nodes[parent].right = NIL;
                }
                self.nodes[p].parent = NIL;
            }
        }

        self.nodes[p].reset();
        true
    }

    /// Make a linked node visible. Returns `false` if nothing changed.
    pub fn check(&mut self, id: NodeId) -> bool {
        match self.node(id) {
            Some(node) if !node.is_removed() && !node.checked => {}
            _ => return false,
        }
        self.nodes[id].checked = true;
        self.increment_count(id);
        true
    }

    /// Hide a linked node. Returns `false` if nothing changed.
    pub fn uncheck(&mut self, id: NodeId) -> bool {
        if !self.is_checked(id) {
            return false;
        }
        self.nodes[id].checked = false;
        self.decrement_count(id);
        true
    }

    /// Detach every node. Allocations survive and keep their values.
    pub fn clear(&mut self) {
        for (id, node) in self.nodes.iter_mut() {
            if id != NIL {
                node.reset();
            }
        }
        self.root = NIL;
        self.size = 0;
        self.tree_size = 0;
        self.mod_count += 1;
    }

    // ========================================================================
    // Convenience API (tests, tools)
    // ========================================================================

    /// Allocate, insert and check a node for `value`.
    pub fn insert_value(&mut self, value: T) -> Result<NodeId> {
        let id = self.allocate(value);
        if let Err(err) = self.insert(id) {
            self.nodes.remove(id);
            return Err(err);
        }
        self.check(id);
        Ok(id)
    }

    /// Delete and free the node holding a value equal to `value`.
    pub fn delete_value(&mut self, value: &T) -> Option<T> {
        let id = self.find(value)?;
        self.release(id)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Walk the whole tree and recompute every invariant from scratch.
    ///
    /// Checks the sentinel, parent links, strict ordering, child counts,
    /// red-black coloring and black height, and the size counters.
    pub fn validate(&self) -> Result<()> {
        let nil = &self.nodes[NIL];
        if nil.left != NIL || nil.right != NIL || nil.parent != NIL {
            return Err(BookError::violation("sentinel is not self-linked"));
        }
        if nil.child_count != 0 || nil.checked || nil.color != Color::Black {
            return Err(BookError::violation("sentinel is not a black empty node"));
        }
        if (self.root != NIL) != (self.tree_size != 0) {
            return Err(BookError::violation(format!(
                "root {} inconsistent with tree size {}",
                self.root, self.tree_size
            )));
        }
        if self.root == NIL {
            return if self.size == 0 {
                Ok(())
            } else {
                Err(BookError::violation(format!("empty tree with size {}", self.size)))
            };
        }

        let root = &self.nodes[self.root];
        if root.parent != NIL {
            return Err(BookError::violation("root has a parent"));
        }
        if root.color != Color::Black {
            return Err(BookError::violation("root is not black"));
        }
        if root.child_count != self.size {
            return Err(BookError::violation(format!(
                "root child count {} != size {}",
                root.child_count, self.size
            )));
        }

        let (_, linked) = self.validate_subtree(self.root)?;
        if linked != self.tree_size {
            return Err(BookError::violation(format!(
                "{} nodes reachable, tree size is {}",
                linked, self.tree_size
            )));
        }
        Ok(())
    }

    /// Returns (black height, node count) of the subtree.
    fn validate_subtree(&self, id: NodeId) -> Result<(usize, usize)> {
        if id == NIL {
            return Ok((1, 0));
        }
        let node = &self.nodes[id];
        if node.color == Color::Removed {
            return Err(BookError::violation(format!("removed node {id} is linked")));
        }

        let mut child_count = node.own_count();
        for (child, is_left) in [(node.left, true), (node.right, false)] {
            if child == NIL {
                continue;
            }
            let c = &self.nodes[child];
            if c.parent != id {
                return Err(BookError::violation(format!(
                    "node {child} has parent {} but hangs under {id}",
                    c.parent
                )));
            }
            let ord = if is_left {
                (self.comparator)(&c.value, &node.value)
            } else {
                (self.comparator)(&node.value, &c.value)
            };
            if ord != Ordering::Less {
                return Err(BookError::violation(format!("nodes {id} and {child} out of order")));
            }
            if node.color == Color::Red && c.color == Color::Red {
                return Err(BookError::violation(format!("red node {id} has red child {child}")));
            }
            child_count += c.child_count;
        }
        if node.child_count != child_count {
            return Err(BookError::violation(format!(
                "node {id} child count {} != recomputed {child_count}",
                node.child_count
            )));
        }

        let (left_height, left_nodes) = self.validate_subtree(node.left)?;
        let (right_height, right_nodes) = self.validate_subtree(node.right)?;
        if left_height != right_height {
            return Err(BookError::violation(format!(
                "black height differs under node {id}: {left_height} vs {right_height}"
            )));
        }
        let own_black = usize::from(node.color == Color::Black);
        Ok((left_height + own_black, left_nodes + right_nodes + 1))
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    #[inline]
    fn left(&self, id: NodeId) -> NodeId {
        self.nodes[id].left
    }

    #[inline]
    fn right(&self, id: NodeId) -> NodeId {
        self.nodes[id].right
    }

    #[inline]
    fn parent(&self, id: NodeId) -> NodeId {
        self.nodes[id].parent
    }

    #[inline]
    fn color(&self, id: NodeId) -> Color {
        self.nodes[id].color
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        self.nodes[id].color = color;
    }

    #[inline]
    fn count(&self, id: NodeId) -> usize {
        self.nodes[id].child_count
    }

    pub(crate) fn first_node(&self) -> NodeId {
        let mut node = self.root;
        if node != NIL {
            while self.left(node) != NIL {
                node = self.left(node);
            }
        }
        node
    }

    /// In-order successor among all linked nodes, `NIL` past the end.
    pub(crate) fn successor(&self, id: NodeId) -> NodeId {
        if id == NIL {
            return NIL;
        }
        if self.right(id) != NIL {
            let mut p = self.right(id);
            while self.left(p) != NIL {
                p = self.left(p);
            }
            return p;
        }
        let mut p = self.parent(id);
        let mut child = id;
        while p != NIL && child == self.right(p) {
            child = p;
            p = self.parent(p);
        }
        p
    }

    /// In-order successor among checked nodes.
    pub(crate) fn checked_successor(&self, id: NodeId) -> NodeId {
        let mut node = self.successor(id);
        while node != NIL && !self.nodes[node].checked {
            node = self.successor(node);
        }
        node
    }

    pub(crate) fn node_value(&self, id: NodeId) -> &T {
        &self.nodes[id].value
    }

    // ========================================================================
    // Counts
    // ========================================================================

    fn increment_count(&mut self, mut id: NodeId) {
        self.mod_count += 1;
        self.size += 1;
        while id != NIL {
            self.nodes[id].child_count += 1;
            id = self.parent(id);
        }
    }

    fn decrement_count(&mut self, mut id: NodeId) {
        self.mod_count += 1;
        self.size -= 1;
        while id != NIL {
            self.nodes[id].child_count -= 1;
            id = self.parent(id);
        }
    }

    // ========================================================================
    // Relinking and rotations
    // ========================================================================

    /// Point `parent`'s link at `new_child` where it pointed at `old_child`.
    /// With `parent == NIL` this moves the root.
    pub(crate) fn relink(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
        if parent == NIL {
            if self.root == old_child {
                self.root = new_child;
            }
        } else if self.left(parent) == old_child {
            self.nodes[parent].left = new_child;
        } else {
            self.nodes[parent].right = new_child;
        }
    }

    /// Point `child`'s parent link at `new_parent` if it pointed at
    /// `old_parent`.
    pub(crate) fn reparent(&mut self, child: NodeId, old_parent: NodeId, new_parent: NodeId) {
        if child != NIL && self.parent(child) == old_parent {
            self.nodes[child].parent = new_parent;
        }
    }

    /// Swap tree positions of `p` (scheduled for deletion) and its
    /// successor `s`. Links, counts and colors follow the position.
    fn swap_for_deletion(&mut self, p: NodeId, s: NodeId) {
        let adjacent = self.right(p) == s;

        self.relink(self.parent(p), p, s);
        if !adjacent {
            self.relink(self.parent(s), s, p);
        }

        self.reparent(self.left(s), s, p);
        self.reparent(self.right(s), s, p);
        self.reparent(self.left(p), p, s);
        if !adjacent {
            self.reparent(self.right(p), p, s);
        } else {
            // Self-links turn into the right mutual links after the swap.
            self.nodes[p].right = p;
            self.nodes[s].parent = s;
        }

        if let Some((pn, sn)) = self.nodes.get2_mut(p, s) {
            mem::swap(&mut pn.parent, &mut sn.parent);
            mem::swap(&mut pn.left, &mut sn.left);
            mem::swap(&mut pn.right, &mut sn.right);
            mem::swap(&mut pn.child_count, &mut sn.child_count);
            mem::swap(&mut pn.color, &mut sn.color);
        }
    }

    /*
     *      p                     r
     *    /   \                 /   \
     *   X     r      ===>     p     Z
     *       /  \            /  \
     *      Y    Z          X    Y
     */
    pub(crate) fn rotate_left(&mut self, p: NodeId) {
        let r = self.right(p);
        debug_assert_ne!(r, NIL);
        let y = self.left(r);
        self.nodes[p].right = y;
        if y != NIL {
            self.nodes[y].parent = p;
        }

        // Only r and Z leave p's subtree; only p and X join r's.
        let right_count = self.nodes[r].own_count() + self.count(self.right(r));
        let left_count = self.nodes[p].own_count() + self.count(self.left(p));

        let parent = self.parent(p);
        self.nodes[r].parent = parent;
        self.relink(parent, p, r);

        self.nodes[r].left = p;
        self.nodes[p].parent = r;

        self.nodes[p].child_count -= right_count;
        self.nodes[r].child_count += left_count;
    }

    /*
     *      p                     l
     *    /   \                 /   \
     *   l     Z      ===>     X     p
     *  /  \                        /  \
     * X    Y                      Y    Z
     */
    pub(crate) fn rotate_right(&mut self, p: NodeId) {
        let l = self.left(p);
        debug_assert_ne!(l, NIL);
        let y = self.right(l);
        self.nodes[p].left = y;
        if y != NIL {
            self.nodes[y].parent = p;
        }

        let left_count = self.nodes[l].own_count() + self.count(self.left(l));
        let right_count = self.nodes[p].own_count() + self.count(self.right(p));

        let parent = self.parent(p);
        self.nodes[l].parent = parent;
        self.relink(parent, p, l);

        self.nodes[l].right = p;
        self.nodes[p].parent = l;

        self.nodes[p].child_count -= left_count;
        self.nodes[l].child_count += right_count;
    }

    fn rebalance_after_insertion(&mut self, mut x: NodeId) {
        self.set_color(x, Color::Red);
        while x != NIL && x != self.root && self.color(self.parent(x)) == Color::Red {
            let xp = self.parent(x);
            let xpp = self.parent(xp);
            if xp == self.left(xpp) {
                let uncle = self.right(xpp);
                if self.color(uncle) == Color::Red {
                    self.set_color(xp, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(xpp, Color::Red);
                    x = xpp;
                } else {
                    if x == self.right(xp) {
                        x = xp;
                        self.rotate_left(x);
                    }
                    let xp = self.parent(x);
                    let xpp = self.parent(xp);
                    self.set_color(xp, Color::Black);
                    self.set_color(xpp, Color::Red);
                    if xpp != NIL {
                        self.rotate_right(xpp);
                    }
                }
            } else {
                let uncle = self.left(xpp);
                if self.color(uncle) == Color::Red {
                    self.set_color(xp, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(xpp, Color::Red);
                    x = xpp;
                } else {
                    if x == self.left(xp) {
                        x = xp;
                        self.rotate_right(x);
                    }
                    let xp = self.parent(x);
                    let xpp = self.parent(xp);
                    self.set_color(xp, Color::Black);
                    self.set_color(xpp, Color::Red);
                    if xpp != NIL {
                        self.rotate_left(xpp);
                    }
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    fn rebalance_after_deletion(&mut self, mut x: NodeId) {
        while x != self.root && self.color(x) == Color::Black {
            let xp = self.parent(x);
            if x == self.left(xp) {
                let mut w = self.right(xp);

                // Case 1: red sibling
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(xp, Color::Red);
                    self.rotate_left(xp);
                    w = self.right(self.parent(x));
                }

                // Case 2: both of the sibling's children are black
                if self.color(self.left(w)) == Color::Black
                    && self.color(self.right(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = self.parent(x);
                } else {
                    // Case 3: sibling's right child is black
                    if self.color(self.right(w)) == Color::Black {
                        let wl = self.left(w);
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.right(self.parent(x));
                    }
                    // Case 4: sibling is black with a red right child
                    let xp = self.parent(x);
                    let parent_color = self.color(xp);
                    self.set_color(w, parent_color);
                    self.set_color(xp, Color::Black);
                    let wr = self.right(w);
                    self.set_color(wr, Color::Black);
                    self.rotate_left(xp);
                    x = self.root;
                }
            } else {
                let mut w = self.left(xp);

                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(xp, Color::Red);
                    self.rotate_right(xp);
                    w = self.left(self.parent(x));
                }

                if self.color(self.right(w)) == Color::Black
                    && self.color(self.left(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = self.parent(x);
                } else {
                    if self.color(self.left(w)) == Color::Black {
                        let wr = self.right(w);
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.left(self.parent(x));
                    }
                    let xp = self.parent(x);
                    let parent_color = self.color(xp);
                    self.set_color(w, parent_color);
                    self.set_color(xp, Color::Black);
                    let wl = self.left(w);
                    self.set_color(wl, Color::Black);
                    self.rotate_right(xp);
                    x = self.root;
                }
            }
        }
        self.set_color(x, Color::Black);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CheckedTree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckedTree")
            .field("len", &self.size)
            .field("tree_len", &self.tree_size)
            .field("mod_count", &self.mod_count)
            .field("checked", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
