//! Pre-trade risk gating and advisory margin evaluation
//!
//! The guard is stateless: it sees a projection of the portfolio after the
//! candidate order and returns the first failing check's reason. Checks run
//! in a fixed order: drawdown, per-instrument notional cap, net exposure
//! cap.

mod limits;

pub use limits::{drawdown, RiskLimits};

use crate::accounting::PaperPosition;
use crate::domain::InstrumentSpec;
use crate::error::RejectReason;
use rust_decimal::Decimal;

/// Portfolio projection for one candidate order
#[derive(Debug, Clone)]
pub struct RiskCheck {
    /// Current equity
    pub equity: Decimal,
    /// Peak equity seen so far
    pub peak_equity: Decimal,
    /// Instrument notional if the order fully filled, at the reference price
    pub projected_instrument_notional: Decimal,
    /// Net signed exposure across instruments if the order fully filled
    pub projected_net_exposure: Decimal,
}

/// Stateless pre-trade checker
#[derive(Debug, Clone, Default)]
pub struct RiskGuard {
    limits: RiskLimits,
}

impl RiskGuard {
    /// Guard with the given limits
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// Configured limits
    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Run all checks in order, returning the first failure
    pub fn check(&self, check: &RiskCheck) -> Result<(), RejectReason> {
        let dd = drawdown(check.peak_equity, check.equity);
        if self.limits.max_drawdown_pct > Decimal::ZERO && dd > self.limits.max_drawdown_pct {
            return Err(RejectReason::DrawdownLimit {
                drawdown: dd,
                limit: self.limits.max_drawdown_pct,
            });
        }
        if self.limits.max_instrument_notional > Decimal::ZERO
            && check.projected_instrument_notional > self.limits.max_instrument_notional
        {
            return Err(RejectReason::InstrumentNotionalCap {
                projected: check.projected_instrument_notional,
                cap: self.limits.max_instrument_notional,
            });
        }
        if self.limits.max_net_exposure > Decimal::ZERO
            && check.projected_net_exposure.abs() > self.limits.max_net_exposure
        {
            return Err(RejectReason::NetExposureCap {
                projected: check.projected_net_exposure,
                cap: self.limits.max_net_exposure,
            });
        }
        Ok(())
    }
}

/// Margin shortfall on a leveraged position
#[derive(Debug, Clone, PartialEq)]
pub struct MarginBreach {
    /// Posted initial margin plus unrealized PnL
    pub margin_balance: Decimal,
    /// Maintenance requirement at the mark
    pub maintenance_margin: Decimal,
}

/// Advisory maintenance check for one leveraged position at a mark price.
///
/// Posted margin is approximated from the entry notional at the account
/// leverage. Returns `Some` when the margin balance no longer covers the
/// maintenance requirement; the caller emits a notice and does not
/// force-close.
pub fn maintenance_breach(
    position: &PaperPosition,
    spec: &InstrumentSpec,
    leverage: Decimal,
    mark: Decimal,
) -> Option<MarginBreach> {
    if !spec.is_leveraged() || position.is_flat() || leverage <= Decimal::ZERO {
        return None;
    }
    let entry_notional = position.quantity.abs() * position.avg_entry_price;
    let posted = entry_notional / leverage * spec.margin_init_ratio;
    let margin_balance = posted + position.unrealized_pnl;
    let maintenance_margin = position.notional(mark) * spec.margin_maint_ratio;
    if margin_balance < maintenance_margin {
        Some(MarginBreach {
            margin_balance,
            maintenance_margin,
        })
    } else {
        None
    }
}
