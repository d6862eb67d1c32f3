//! In-order traversal of a [`CheckedTree`].
//!
//! [`Iter`] and [`TreeIter`] borrow the tree, so the borrow checker rules
//! out modification while they are alive. [`Cursor`] holds no borrow: it
//! remembers the modification counter it was created at and refuses to
//! move once the tree has changed.

use std::iter::FusedIterator;

use crate::error::{BookError, Result};
use crate::tree::node::{NodeId, NIL};
use crate::tree::CheckedTree;

/// Iterator over checked values.
pub struct Iter<'a, T> {
    tree: &'a CheckedTree<T>,
    next: NodeId,
    remaining: usize,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(tree: &'a CheckedTree<T>, first: NodeId, remaining: usize) -> Self {
        Self {
            tree,
            next: first,
            remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let current = self.next;
        self.next = self.tree.checked_successor(current);
        self.remaining -= 1;
        Some(self.tree.node_value(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Iterator over every linked value, checked or not.
pub struct TreeIter<'a, T> {
    tree: &'a CheckedTree<T>,
    next: NodeId,
    remaining: usize,
}

impl<'a, T> TreeIter<'a, T> {
    pub(crate) fn new(tree: &'a CheckedTree<T>, first: NodeId, remaining: usize) -> Self {
        Self {
            tree,
            next: first,
            remaining,
        }
    }
}

impl<'a, T> Iterator for TreeIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let current = self.next;
        self.next = self.tree.successor(current);
        self.remaining -= 1;
        Some(self.tree.node_value(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for TreeIter<'_, T> {}
impl<T> FusedIterator for TreeIter<'_, T> {}

/// Position in a tree that survives between borrows.
///
/// Every step checks the tree's modification counter first and fails with
/// [`BookError::ConcurrentModification`] if anything changed since the
/// cursor was created.
#[derive(Debug, Clone)]
pub struct Cursor {
    next: NodeId,
    expected_mod_count: u64,
    checked_only: bool,
}

impl Cursor {
    pub(crate) fn new(first: NodeId, mod_count: u64, checked_only: bool) -> Self {
        Self {
            next: first,
            expected_mod_count: mod_count,
            checked_only,
        }
    }

    /// Whether the cursor ran past the last value.
    pub fn is_exhausted(&self) -> bool {
        self.next == NIL
    }

    /// Step to the next value of `tree`.
    pub fn next<'a, T>(&mut self, tree: &'a CheckedTree<T>) -> Result<Option<&'a T>> {
        if self.next == NIL {
            return Ok(None);
        }
        let actual = tree.mod_count();
        if actual != self.expected_mod_count {
            return Err(BookError::ConcurrentModification {
                expected: self.expected_mod_count,
                actual,
            });
        }
        let current = self.next;
        self.next = if self.checked_only {
            tree.checked_successor(current)
        } else {
            tree.successor(current)
        };
        Ok(Some(tree.node_value(current)))
    }
}
