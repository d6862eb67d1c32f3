//! Order book engine for one symbol.
//!
//! ## Design Principles
//!
//! 1. **Pull model**: a notification only says "changed"; consumers re-read
//!    the visible lists
//! 2. **One notification per transaction**, whatever the number of orders
//! 3. **Raw orders kept**: lot size and filter changes are reapplied
//!    exactly
//! 4. **Single writer**: the engine is not synchronized; only listener
//!    registration and delivery cross threads
//!
//! See [`book`] for the life of an order and [`notify`] for delivery.

pub mod book;
pub mod notify;

pub use book::{CorrectionSettings, OrderBookEngine};
pub use notify::{BookChange, BookListener, EngineId, Executor, InlineExecutor, Notifier, Task};
