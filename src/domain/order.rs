//! Order lifecycle types

use crate::domain::InstrumentId;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy the base asset
    Buy,
    /// Sell the base asset
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// The opposing side
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Limit order
    Limit,
    /// Limit order that must rest (post-only)
    LimitMaker,
    /// Market order, priced off the book at submission
    Market,
}

/// Order lifecycle status.
///
/// Terminal states are `Filled`, `Canceled` and `Rejected`; transitions
/// outside [`OrderStatus::transition_to`]'s allowed set surface as
/// [`EngineError::InvalidTransition`] and act as a replay-safety guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted for submission, waiting out insertion latency
    PendingSubmit,
    /// Resting on the simulated book
    Open,
    /// Some quantity executed, remainder still open
    PartiallyFilled,
    /// Fully executed
    Filled,
    /// Canceled before completion
    Canceled,
    /// Refused before acceptance
    Rejected,
}

impl OrderStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// Whether orders in this status participate in matching
    pub fn is_matchable(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Validate a transition against the closed set of allowed pairs
    pub fn transition_to(self, to: OrderStatus) -> Result<OrderStatus, EngineError> {
        use OrderStatus::*;
        match (self, to) {
            (PendingSubmit, Open)
            | (PendingSubmit, Canceled)
            | (PendingSubmit, Rejected)
            | (Open, PartiallyFilled)
            | (Open, Filled)
            | (Open, Canceled)
            | (PartiallyFilled, PartiallyFilled)
            | (PartiallyFilled, Filled)
            | (PartiallyFilled, Canceled) => Ok(to),
            (from, to) => Err(EngineError::InvalidTransition { from, to }),
        }
    }
}

/// Funds set aside against an open order.
///
/// Owned by the engine that accepted the order; a share is released on each
/// fill and the remainder goes back to the ledger on the terminal
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reserved asset symbol
    pub asset: String,
    /// Amount reserved at acceptance
    pub amount: Decimal,
    /// Amount still held
    pub remaining: Decimal,
}

impl Reservation {
    /// New reservation with nothing yet released
    pub fn new(asset: impl Into<String>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
            remaining: amount,
        }
    }

    /// Take up to `share` out of the remaining hold, returning what was taken
    pub fn take(&mut self, share: Decimal) -> Decimal {
        let taken = share.min(self.remaining).max(Decimal::ZERO);
        self.remaining -= taken;
        taken
    }

    /// Take everything still held
    pub fn take_all(&mut self) -> Decimal {
        let taken = self.remaining;
        self.remaining = Decimal::ZERO;
        taken
    }
}

/// A simulated order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    /// Order identifier
    pub id: OrderId,
    /// Instrument the order trades
    pub instrument: InstrumentId,
    /// Trade side
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Quantized order price (reference price for market orders)
    pub price: Decimal,
    /// Quantized order quantity
    pub quantity: Decimal,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Cumulative filled quantity
    pub filled_quantity: Decimal,
    /// Cumulative filled notional
    pub filled_notional: Decimal,
    /// Cumulative fees paid
    pub fee_paid: Decimal,
    /// Number of fills so far
    pub fill_count: u32,
    /// Maker order that crossed the book at submission and was kept
    pub crossed: bool,
    /// Submitting strategy or operator tag
    pub source: String,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
    /// When the order leaves the latency queue
    pub activate_at: DateTime<Utc>,
    /// Last fill timestamp
    pub last_fill_at: Option<DateTime<Utc>>,
    /// Terminal timestamp
    pub closed_at: Option<DateTime<Utc>>,
    /// Reservation ticket held against the order
    pub reservation: Option<Reservation>,
}

impl PaperOrder {
    /// Quantity still unfilled
    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    /// Whether the order reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Volume-weighted average fill price, zero before the first fill
    pub fn avg_fill_price(&self) -> Decimal {
        if self.filled_quantity > Decimal::ZERO {
            self.filled_notional / self.filled_quantity
        } else {
            Decimal::ZERO
        }
    }

    /// Move to a new status after validating the transition
    pub fn set_status(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.status = self.status.transition_to(to)?;
        if self.status.is_terminal() {
            self.closed_at = Some(now);
        }
        Ok(())
    }
}
