//! Error types for the matching engine.
//!
//! Policy outcomes (an FOK that cannot be filled, an IOC or market order
//! with an unfilled remainder) are not errors: they return `Ok` with the
//! trades that did execute, possibly none.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::command::OrderId;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Price must be strictly positive for priced order types.
    #[error("invalid price: {0} (must be > 0)")]
    InvalidPrice(Decimal),

    /// Quantity must be strictly positive.
    #[error("invalid quantity: {0} (must be > 0)")]
    InvalidQuantity(Decimal),

    /// A floating-point input was NaN, infinite, or outside the decimal range.
    #[error("non-finite {field}: {value}")]
    NonFinite {
        /// Which input was rejected ("price" or "quantity")
        field: &'static str,
        /// The raw value as received
        value: f64,
    },

    /// A numeric token could not be parsed as a decimal.
    #[error("malformed {field}: {token:?}")]
    MalformedNumber {
        /// Which input was rejected
        field: &'static str,
        /// The raw token as received
        token: String,
    },

    /// Side token was not BUY or SELL.
    #[error("unknown side: {0:?}")]
    UnknownSide(String),

    /// Order type token was not LIMIT, MARKET, IOC or FOK.
    #[error("unknown order type: {0:?}")]
    UnknownOrderType(String),

    /// No resting order with this id.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Taker rate must be non-negative and strictly above the maker rate.
    #[error("invalid fee schedule: maker rate {maker}, taker rate {taker}")]
    InvalidFeeSchedule {
        /// Configured maker rate
        maker: Decimal,
        /// Configured taker rate
        taker: Decimal,
    },

    /// A price, quantity or fee would exceed the decimal range.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    /// The order arena ran out of index space.
    #[error("order arena exhausted")]
    ArenaExhausted,

    /// A trade listener is already installed on this engine.
    #[error("trade listener already registered")]
    ListenerAlreadyRegistered,

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
