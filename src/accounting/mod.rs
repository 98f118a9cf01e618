//! Position accounting
//!
//! [`apply_fill`] is the single source of truth for realized PnL: it
//! classifies the effect of one fill on one position and attributes the
//! closing leg's PnL exactly once, including across direction flips.

mod position;

pub use position::PaperPosition;

use crate::domain::{FillTransition, Side};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

/// Quantities with absolute value below this snap to exactly zero
pub fn dust_epsilon() -> Decimal {
    Decimal::new(1, 9)
}

/// Result of applying one fill to one position
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    /// Position state after the fill
    pub position: PaperPosition,
    /// Realized PnL attributed to this fill, price-only
    pub realized_pnl: Decimal,
    /// How the fill changed the position
    pub transition: FillTransition,
}

/// Apply one fill to a position, returning the new state, the realized PnL
/// for this fill and the transition classification.
///
/// Pure: the input position is not mutated. Fees are not handled here.
pub fn apply_fill(
    position: &PaperPosition,
    side: Side,
    quantity: Decimal,
    price: Decimal,
    now: DateTime<Utc>,
) -> FillOutcome {
    let mut next = position.clone();
    let signed_delta = side.sign() * quantity;
    let old_qty = position.quantity;
    let new_qty = old_qty + signed_delta;
    let eps = dust_epsilon();

    let (transition, realized) = if old_qty.is_zero() {
        next.quantity = signed_delta;
        next.avg_entry_price = price;
        next.opened_at = Some(now);
        (FillTransition::Open, Decimal::ZERO)
    } else if old_qty.signum() == signed_delta.signum() {
        let old_abs = old_qty.abs();
        next.avg_entry_price =
            (old_abs * position.avg_entry_price + quantity * price) / (old_abs + quantity);
        next.quantity = new_qty;
        (FillTransition::Add, Decimal::ZERO)
    } else if signed_delta.abs() <= old_qty.abs() {
        // Shrinks without crossing zero
        let close_qty = signed_delta.abs().min(old_qty.abs());
        let realized = (price - position.avg_entry_price) * close_qty * old_qty.signum();
        if new_qty.abs() <= eps {
            next.quantity = Decimal::ZERO;
            next.avg_entry_price = Decimal::ZERO;
            next.opened_at = None;
            (FillTransition::Close, realized)
        } else {
            next.quantity = new_qty;
            (FillTransition::Reduce, realized)
        }
    } else {
        // Crosses zero: realize the closing leg only, re-open the residual
        let close_qty = old_qty.abs();
        let realized = (price - position.avg_entry_price) * close_qty * old_qty.signum();
        let open_qty = signed_delta.abs() - close_qty;
        if open_qty <= eps {
            next.quantity = Decimal::ZERO;
            next.avg_entry_price = Decimal::ZERO;
            next.opened_at = None;
            (FillTransition::Close, realized)
        } else {
            next.quantity = signed_delta.signum() * open_qty;
            next.avg_entry_price = price;
            next.opened_at = Some(now);
            (FillTransition::Flip, realized)
        }
    };

    if !next.quantity.is_zero() && next.quantity.abs() <= eps {
        next.quantity = Decimal::ZERO;
        next.avg_entry_price = Decimal::ZERO;
        next.opened_at = None;
    }

    next.realized_pnl += realized;
    next.last_fill_at = Some(now);

    FillOutcome {
        position: next,
        realized_pnl: realized,
        transition,
    }
}
