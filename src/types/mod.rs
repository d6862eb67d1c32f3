//! Core data types for the order book model
//!
//! - [`Order`]: an order event of some [`Scope`] on some [`Side`]
//! - [`ScopeFilter`]: which scopes may be shown
//! - [`BookDigest`]: deterministic fingerprint of the visible book
//!
//! ## Fixed-Point Arithmetic
//!
//! All prices and sizes are stored as `u64` scaled by 10^8.

mod order;
mod filter;
mod digest;
pub mod price;

pub use order::{Order, Scope, Side, EXCHANGE_COUNT};
pub use filter::ScopeFilter;
pub use digest::{BookDigest, QuoteRecord};
