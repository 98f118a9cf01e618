//! Risk limits and drawdown arithmetic

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Portfolio-wide pre-trade limits.
///
/// A cap of zero disables that check.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimits {
    /// Maximum drawdown from peak equity, as a fraction
    pub max_drawdown_pct: Decimal,
    /// Maximum notional per instrument, in quote units
    pub max_instrument_notional: Decimal,
    /// Maximum net signed exposure across instruments, in quote units
    pub max_net_exposure: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown_pct: dec!(0.25),
            max_instrument_notional: dec!(0),
            max_net_exposure: dec!(0),
        }
    }
}

/// Drawdown from peak as a fraction of peak; zero when peak is zero
pub fn drawdown(peak_equity: Decimal, current_equity: Decimal) -> Decimal {
    if peak_equity <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((peak_equity - current_equity) / peak_equity).max(Decimal::ZERO)
}
