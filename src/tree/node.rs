//! Tree node for slab-based storage.
//!
//! ## Design
//!
//! `TreeNode` wraps a value with red-black tree links. The links are slab
//! keys ([`NodeId`]), not references, so the parent/child cycle of a tree
//! never turns into an ownership cycle.
//!
//! ## Sentinel
//!
//! Slot [`NIL`] of every tree's slab holds the sentinel: it is black, its
//! `child_count` is always 0, and it is its own left, right and parent.
//! Leaves point at it instead of holding `Option`s, which keeps the
//! rebalancing code free of special cases.
//!
//! ## Lifecycle
//!
//! ```text
//! allocate -> (insert -> delete)* -> release
//! ```
//!
//! A node that is not linked into the tree has color [`Color::Removed`] and
//! all its links point at `NIL`. Only such detached nodes may have their
//! value replaced.

/// Slab key of a tree node.
pub type NodeId = usize;

/// Slab key of the sentinel node.
pub const NIL: NodeId = 0;

/// Node color. `Removed` marks nodes that are not linked into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Removed,
    Red,
    Black,
}

/// Node stored in the tree slab.
#[derive(Debug, Clone)]
pub struct TreeNode<T> {
    pub(crate) left: NodeId,
    pub(crate) right: NodeId,
    pub(crate) parent: NodeId,

    /// Checked nodes in the subtree rooted here, including self
    pub(crate) child_count: usize,

    /// Whether this node counts toward rank and shows in the checked list
    pub(crate) checked: bool,

    pub(crate) color: Color,

    pub(crate) value: T,
}

impl<T> TreeNode<T> {
    /// Create a detached node.
    pub(crate) fn detached(value: T) -> Self {
        Self {
            left: NIL,
            right: NIL,
            parent: NIL,
            child_count: 0,
            checked: false,
            color: Color::Removed,
            value,
        }
    }

    /// Create the sentinel: black, self-linked.
    pub(crate) fn sentinel(value: T) -> Self {
        Self {
            color: Color::Black,
            ..Self::detached(value)
        }
    }

    /// Contribution of this node alone to `child_count`.
    #[inline]
    pub(crate) fn own_count(&self) -> usize {
        usize::from(self.checked)
    }

    /// Whether the node is linked into the tree.
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.color == Color::Removed
    }

    /// Whether the node is visible.
    #[inline]
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Checked nodes in this subtree, including self.
    #[inline]
    pub fn child_count(&self) -> usize {
        self.child_count
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Unlink and mark removed. Leaves the value alone.
    pub(crate) fn reset(&mut self) {
        self.left = NIL;
        self.right = NIL;
        self.parent = NIL;
        self.child_count = 0;
        self.checked = false;
        self.color = Color::Removed;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_node() {
        let node = TreeNode::detached(42u32);
        assert!(node.is_removed());
        assert!(!node.is_checked());
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.own_count(), 0);
        assert_eq!((node.left, node.right, node.parent), (NIL, NIL, NIL));
    }

    #[test]
    fn test_sentinel_node() {
        let nil = TreeNode::sentinel(0u32);
        assert_eq!(nil.color(), Color::Black);
        assert!(!nil.is_removed());
        assert_eq!(nil.child_count(), 0);
    }

    #[test]
    fn test_reset() {
        let mut node = TreeNode::detached(1u32);
        node.left = 3;
        node.parent = 5;
        node.checked = true;
        node.child_count = 2;
        node.color = Color::Red;

        node.reset();
        assert!(node.is_removed());
        assert_eq!(node.own_count(), 0);
        assert_eq!(node.left, NIL);
        assert_eq!(*node.value(), 1);
    }
}
