//! Position state

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-instrument position record.
///
/// Quantity is signed, positive for long. Invariant: a flat position has a
/// zero average entry price. Realized PnL is pure price PnL; fees and
/// funding accumulate in their own running totals and are never mixed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperPosition {
    /// Instrument key
    pub instrument: String,
    /// Signed quantity, positive = long
    pub quantity: Decimal,
    /// Volume-weighted average entry price
    pub avg_entry_price: Decimal,
    /// Cumulative realized PnL, price-only
    pub realized_pnl: Decimal,
    /// Mark-to-market PnL, recomputed each cycle
    pub unrealized_pnl: Decimal,
    /// Cumulative fees paid
    pub fees_paid: Decimal,
    /// Cumulative funding paid
    pub funding_paid: Decimal,
    /// When the current position was opened
    pub opened_at: Option<DateTime<Utc>>,
    /// Last fill timestamp
    pub last_fill_at: Option<DateTime<Utc>>,
}

impl PaperPosition {
    /// Flat position for an instrument
    pub fn flat(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            funding_paid: Decimal::ZERO,
            opened_at: None,
            last_fill_at: None,
        }
    }

    /// Whether the position holds no quantity
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Whether the position is long
    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Absolute notional at the given mark price
    pub fn notional(&self, mark: Decimal) -> Decimal {
        self.quantity.abs() * mark
    }
}
