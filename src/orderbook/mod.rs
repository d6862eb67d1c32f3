//! Order book sides with scope override.
//!
//! ## Architecture
//!
//! Each side of the book is a [`ScopeOverrideIndex`]: a [`CheckedTree`]
//! of orders sorted by the side's priority, where only the winning scope
//! of every venue and market maker is checked. The checked subset, in tree
//! order, is the visible book.
//!
//! ## Components
//!
//! - [`comparator`]: buy and sell priority
//! - [`ScopeOverrideIndex`]: tree plus the scope tables deciding visibility
//!
//! ## Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | Insert / delete order | O(log n) |
//! | Visible order at rank | O(log n) |
//! | Rank of order | O(log n) |
//! | Iterate visible orders | O(1) amortized per step |
//!
//! [`CheckedTree`]: crate::tree::CheckedTree

pub mod comparator;
pub mod scope_index;

pub use scope_index::ScopeOverrideIndex;
