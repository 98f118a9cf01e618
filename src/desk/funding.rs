//! Funding simulation
//!
//! Runs once per desk tick, after every engine has ticked. Charges are
//! settled through the portfolio so balances and position totals stay
//! consistent.

use crate::domain::{EngineEvent, InstrumentSpec};
use crate::portfolio::PaperPortfolio;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Applies funding charges across instruments
pub trait FundingSimulator {
    /// Charge whatever is due this cycle.
    ///
    /// `instruments` maps instrument keys to their spec and current funding
    /// rate; `marks` carries the freshest mark prices collected this tick.
    fn tick(
        &mut self,
        now: DateTime<Utc>,
        portfolio: &mut PaperPortfolio,
        instruments: &HashMap<String, (InstrumentSpec, Decimal)>,
        marks: &HashMap<String, Decimal>,
    ) -> Vec<EngineEvent>;
}

/// Charges `quantity x mark x rate` once per funding interval.
///
/// Longs pay a positive rate, shorts receive it. The first sighting of an
/// instrument arms its interval without charging.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalFundingSimulator;

impl IntervalFundingSimulator {
    /// New simulator
    pub fn new() -> Self {
        Self
    }
}

impl FundingSimulator for IntervalFundingSimulator {
    fn tick(
        &mut self,
        now: DateTime<Utc>,
        portfolio: &mut PaperPortfolio,
        instruments: &HashMap<String, (InstrumentSpec, Decimal)>,
        marks: &HashMap<String, Decimal>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for (key, (spec, rate)) in instruments {
            if spec.funding_interval_secs == 0 {
                continue;
            }
            let Some(stamp) = portfolio.funding_stamp(key) else {
                portfolio.note_funding_time(key, now);
                continue;
            };
            if now - stamp < Duration::seconds(spec.funding_interval_secs as i64) {
                continue;
            }
            let quantity = portfolio
                .position(key)
                .map(|p| p.quantity)
                .unwrap_or_default();
            if quantity.is_zero() {
                portfolio.note_funding_time(key, now);
                continue;
            }
            let Some(mark) = marks.get(key) else {
                continue;
            };
            let charge = quantity * *mark * *rate;
            events.push(portfolio.apply_funding(spec, *rate, charge, now));
        }
        events
    }
}
