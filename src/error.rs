//! Error taxonomy
//!
//! Rejections are expected, user-facing outcomes and travel inside
//! `OrderRejected` events. `EngineError` covers programming or replay
//! consistency faults; public engine methods convert these to events
//! instead of propagating them.

use crate::domain::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason an order was refused
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Order price must be strictly positive
    #[error("price must be positive")]
    PriceNotPositive,
    /// Market order with no book to price it against
    #[error("no market price available")]
    NoMarketPrice,
    /// Quantity below the instrument minimum
    #[error("quantity below minimum {min}")]
    QuantityBelowMinimum { min: Decimal },
    /// Quantity above the instrument maximum
    #[error("quantity above maximum {max}")]
    QuantityAboveMaximum { max: Decimal },
    /// Order notional below the instrument minimum
    #[error("notional below minimum {min}")]
    NotionalBelowMinimum { min: Decimal },
    /// Maker order would trade immediately against the book
    #[error("maker order would cross at {opposite}")]
    MakerWouldCross { opposite: Decimal },
    /// Reservation not affordable
    #[error("insufficient {asset}: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },
    /// Portfolio drawdown past the hard ceiling
    #[error("drawdown {drawdown} exceeds limit {limit}")]
    DrawdownLimit { drawdown: Decimal, limit: Decimal },
    /// Projected instrument notional past the per-instrument cap
    #[error("instrument notional {projected} exceeds cap {cap}")]
    InstrumentNotionalCap { projected: Decimal, cap: Decimal },
    /// Projected net exposure past the portfolio cap
    #[error("net exposure {projected} exceeds cap {cap}")]
    NetExposureCap { projected: Decimal, cap: Decimal },
    /// Order addressed to an instrument the desk does not know
    #[error("unknown instrument {key}")]
    UnknownInstrument { key: String },
}

/// Internal engine faults
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Order lifecycle transition not in the allowed set
    #[error("invalid order transition {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    /// Unexpected fault inside a pluggable model or book access
    #[error("internal fault in {context}: {message}")]
    Internal { context: String, message: String },
}
