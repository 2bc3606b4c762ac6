//! # Matchbook
//!
//! A single-symbol, single-threaded limit order book matching engine.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns the book exclusively (no locks)
//! - **Price-Time Priority**: better prices match first, FIFO within a level
//! - **Pool Allocation**: no heap allocation in the hot path after startup
//! - **Dense Side Books**: sorted vectors with the best price at the back,
//!   so top-of-book access and pop are O(1)
//!
//! ## Architecture
//!
//! ```text
//! add_limit_order / cancel_order --> [MatchingEngine] --> Trade callback
//!                                     |           |
//!                               [SideBook x2] [OrderPool]
//! ```

pub mod engine;
pub mod pool;
pub mod price_level;
pub mod side_book;
pub mod types;

// Re-exports for convenience
pub use engine::MatchingEngine;
pub use pool::{Order, OrderPool, SlotIndex, NULL_INDEX};
pub use price_level::PriceLevel;
pub use side_book::{SideBook, DEFAULT_MAX_PRICE_LEVELS};
pub use types::{Side, Trade};
