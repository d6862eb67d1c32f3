//! Order-statistics red-black tree with a checked subset.
//!
//! - [`CheckedTree`]: the tree and its list view over checked nodes
//! - [`TreeNode`]: arena node with links, color and checked count
//! - [`Iter`], [`TreeIter`], [`Cursor`]: in-order traversal

mod checked;
mod iter;
mod node;

pub use checked::{CheckedTree, Comparator};
pub use iter::{Cursor, Iter, TreeIter};
pub use node::{Color, NodeId, TreeNode, NIL};
