//! # Match-Book
//!
//! A deterministic single-instrument limit order book with a continuous
//! double-auction matching engine.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: all mutation of a book is serialized behind one lock
//! - **O(1) Cancel**: a locator index maps each resting order to its slot
//! - **Price-Time Priority**: best price first, FIFO within a level
//! - **Exact Arithmetic**: prices, quantities and fees are decimals
//!
//! ## Order Lifetimes
//!
//! | Type   | Bound         | Remainder          |
//! |--------|---------------|--------------------|
//! | LIMIT  | own price     | rests in the book  |
//! | MARKET | none          | discarded          |
//! | IOC    | inclusive     | discarded          |
//! | FOK    | inclusive     | all or nothing     |
//!
//! ## Architecture
//!
//! ```text
//! [Callers] --submit/cancel/adjust--> [Engine: RwLock<MatchingEngine>]
//!                                           |            |
//!                                    [Trade listener] [Market data view]
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod fees;
pub mod market_data;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod sequence;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderHandle, OrderNode, NULL_INDEX};
pub use command::{
    AdjustLevel, BookUpdate, CancelOrder, CanceledOrder, Command, OrderAccepted, OrderId,
    OrderRequest, OrderType, OutputEvent, RestingOrder, Role, Side, Trade, TradeId,
};
pub use config::{EngineConfig, ReadConsistency};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use fees::FeeSchedule;
pub use market_data::{BookSnapshot, MarketDataView, Quote, TopOfBook};
pub use matching::{Clock, Execution, MatchingEngine, TradeListener};
pub use order_book::{LevelStore, OrderBook};
pub use price_level::PriceLevel;
pub use sequence::SequenceGenerator;
