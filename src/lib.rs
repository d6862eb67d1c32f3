//! # Order Book Model
//!
//! Reconstructs a readable order book from unordered order events quoted
//! at several granularities: composite, regional, aggregate and individual
//! orders.
//!
//! ## Architecture
//!
//! - **Tree**: arena red-black tree with checked/unchecked nodes and
//!   O(log n) rank of the checked ones
//! - **OrderBook**: per-side scope override index deciding which quotes
//!   are visible
//! - **Corrector**: heuristic filter for stale aggregate quotes
//! - **Feed**: per-source transaction and snapshot assembly
//! - **Engine**: one symbol, both sides, change notification
//!
//! ## Design Principles
//!
//! 1. **Determinism**: identical event streams give identical books
//!    (see [`types::BookDigest`])
//! 2. **No Floating Point**: prices and sizes are fixed-point (10^8 scaling)
//! 3. **Arena Storage**: tree nodes live in a slab, addressed by index
//! 4. **Synchronous Core**: no locks or async in the book itself

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: Order, Scope, Side, ScopeFilter, BookDigest
pub mod types;

/// Checked red-black tree
pub mod tree;

/// Book sides with scope override
pub mod orderbook;

/// Aggregate quote corrector
pub mod corrector;

/// Stream flags and transaction assembly
pub mod feed;

/// Order book engine and change notification
pub mod engine;

/// Environment configuration
pub mod config;

/// Error type
pub mod error;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use config::BookConfig;
pub use corrector::OrderBookCorrector;
pub use engine::{BookChange, BookListener, CorrectionSettings, OrderBookEngine};
pub use error::{BookError, Result};
pub use feed::{EventFlags, OrderEvent};
pub use orderbook::ScopeOverrideIndex;
pub use tree::CheckedTree;
pub use types::{BookDigest, Order, Scope, ScopeFilter, Side};
