//! Per-tick visible-depth consumption ledger
//!
//! Several orders matching in the same tick must not be granted more
//! liquidity than the book actually shows at a level. The ledger records
//! what each tick has already consumed per (side, price) and clamps
//! further requests to what is left.

use crate::domain::{OrderBookSnapshot, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Tracks liquidity consumed from the current book within one tick
#[derive(Debug, Default)]
pub struct DepthLedger {
    consumed: HashMap<(Side, Decimal), Decimal>,
}

impl DepthLedger {
    /// Fresh ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all consumption; called when a new tick begins
    pub fn reset(&mut self) {
        self.consumed.clear();
    }

    /// Grant up to `want` units from the far side of the book for a taker
    /// on `side`, within the optional price limit, and record the grant.
    pub fn clamp(
        &mut self,
        book: &OrderBookSnapshot,
        side: Side,
        limit: Option<Decimal>,
        want: Decimal,
    ) -> Decimal {
        let levels = match side {
            Side::Buy => &book.asks,
            Side::Sell => &book.bids,
        };
        let mut outstanding = want;
        let mut granted = Decimal::ZERO;
        for level in levels {
            if outstanding <= Decimal::ZERO {
                break;
            }
            if let Some(limit) = limit {
                let past_limit = match side {
                    Side::Buy => level.price > limit,
                    Side::Sell => level.price < limit,
                };
                if past_limit {
                    break;
                }
            }
            let used = self
                .consumed
                .get(&(side, level.price))
                .copied()
                .unwrap_or_default();
            let free = (level.size - used).max(Decimal::ZERO);
            let take = outstanding.min(free);
            if take > Decimal::ZERO {
                *self.consumed.entry((side, level.price)).or_default() += take;
                granted += take;
                outstanding -= take;
            }
        }
        granted
    }
}
