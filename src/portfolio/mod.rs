//! Paper portfolio
//!
//! Composes the asset ledger, the risk guard and the per-instrument
//! position map into the one aggregate that owns all shared mutable state.
//! Nothing else writes balances or positions; engines go through the
//! methods here.

mod snapshot;

pub use snapshot::{JsonFileStore, PortfolioSnapshot, StateStore};

use crate::accounting::{apply_fill, FillOutcome, PaperPosition};
use crate::domain::{EngineEvent, InstrumentSpec, Side};
use crate::error::RejectReason;
use crate::ledger::AssetLedger;
use crate::risk::{RiskCheck, RiskGuard, RiskLimits};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// The capital pool shared by every engine on the desk
pub struct PaperPortfolio {
    ledger: AssetLedger,
    guard: RiskGuard,
    positions: HashMap<String, PaperPosition>,
    specs: HashMap<String, InstrumentSpec>,
    /// Assets counted as cash in equity (quote assets and seeded capital)
    cash_assets: HashSet<String>,
    last_marks: HashMap<String, Decimal>,
    funding_stamps: HashMap<String, DateTime<Utc>>,
    peak_equity: Decimal,
    last_equity: Decimal,
}

impl PaperPortfolio {
    /// Portfolio seeded with initial balances and risk limits
    pub fn new(initial_balances: &HashMap<String, Decimal>, limits: RiskLimits) -> Self {
        let ledger = AssetLedger::with_balances(initial_balances);
        let cash_assets: HashSet<String> = initial_balances.keys().cloned().collect();
        let starting_equity: Decimal = initial_balances.values().copied().sum();
        Self {
            ledger,
            guard: RiskGuard::new(limits),
            positions: HashMap::new(),
            specs: HashMap::new(),
            cash_assets,
            last_marks: HashMap::new(),
            funding_stamps: HashMap::new(),
            peak_equity: starting_equity,
            last_equity: starting_equity,
        }
    }

    /// Make an instrument known; its quote asset counts as cash
    pub fn register_instrument(&mut self, spec: InstrumentSpec) {
        self.cash_assets.insert(spec.id.quote_asset().to_string());
        self.specs.insert(spec.id.key(), spec);
    }

    /// Read-only ledger access
    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    /// Position for an instrument key, if any quantity was ever traded
    pub fn position(&self, key: &str) -> Option<&PaperPosition> {
        self.positions.get(key)
    }

    /// Iterate all positions
    pub fn positions(&self) -> impl Iterator<Item = &PaperPosition> {
        self.positions.values()
    }

    /// Current equity as of the last settlement or mark-to-market
    pub fn equity(&self) -> Decimal {
        self.last_equity
    }

    /// Highest equity seen
    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    /// Last funding application for an instrument key
    pub fn funding_stamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.funding_stamps.get(key).copied()
    }

    /// Record a funding timestamp without charging, (re)arming the interval
    pub fn note_funding_time(&mut self, key: &str, now: DateTime<Utc>) {
        self.funding_stamps.insert(key.to_string(), now);
    }

    /// Whether a reservation fits the available balance
    pub fn can_reserve(&self, asset: &str, amount: Decimal) -> bool {
        self.ledger.can_reserve(asset, amount)
    }

    /// Set funds aside for an accepted order
    pub fn reserve(&mut self, asset: &str, amount: Decimal) {
        self.ledger.reserve(asset, amount);
    }

    /// Return reserved funds
    pub fn release(&mut self, asset: &str, amount: Decimal) {
        self.ledger.release(asset, amount);
    }

    /// Signed exposure of one instrument at its freshest mark
    pub fn instrument_exposure(&self, key: &str) -> Decimal {
        let Some(position) = self.positions.get(key) else {
            return Decimal::ZERO;
        };
        position.quantity * self.mark_or_entry(key, position)
    }

    /// Net signed exposure across all instruments
    pub fn net_exposure(&self) -> Decimal {
        self.positions
            .keys()
            .map(|key| self.instrument_exposure(key))
            .sum()
    }

    /// Run the pre-trade risk checks for a candidate order
    pub fn pre_trade_check(
        &self,
        key: &str,
        side: Side,
        quantity: Decimal,
        ref_price: Decimal,
    ) -> Result<(), RejectReason> {
        let old_qty = self
            .positions
            .get(key)
            .map(|p| p.quantity)
            .unwrap_or_default();
        let projected_qty = old_qty + side.sign() * quantity;
        let check = RiskCheck {
            equity: self.last_equity,
            peak_equity: self.peak_equity,
            projected_instrument_notional: projected_qty.abs() * ref_price,
            projected_net_exposure: self.net_exposure() - self.instrument_exposure(key)
                + projected_qty * ref_price,
        };
        self.guard.check(&check)
    }

    /// Settle one fill: position accounting first, then ledger movement.
    ///
    /// Spot moves full notional plus fee between base and quote; leveraged
    /// instruments move only the fee and the realized PnL (margin-only
    /// settlement). Returns the accounting outcome with fees applied.
    pub fn settle_fill(
        &mut self,
        spec: &InstrumentSpec,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> FillOutcome {
        let key = spec.id.key();
        let position = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| PaperPosition::flat(key.clone()));

        let mut outcome = apply_fill(position, side, quantity, price, now);
        outcome.position.fees_paid += fee;
        *position = outcome.position.clone();

        let quote = spec.id.quote_asset();
        let notional = quantity * price;
        if spec.is_leveraged() {
            self.ledger.debit(quote, fee);
            if outcome.realized_pnl > Decimal::ZERO {
                self.ledger.credit(quote, outcome.realized_pnl);
            } else {
                self.ledger.debit(quote, -outcome.realized_pnl);
            }
            self.last_equity += outcome.realized_pnl - fee;
        } else {
            let base = spec.id.base_asset();
            match side {
                Side::Buy => {
                    self.ledger.debit(quote, notional + fee);
                    self.ledger.credit(base, quantity);
                }
                Side::Sell => {
                    self.ledger.debit(base, quantity);
                    self.ledger.credit(quote, notional - fee);
                }
            }
            self.last_equity -= fee;
        }
        self.peak_equity = self.peak_equity.max(self.last_equity);

        outcome
    }

    /// Recompute unrealized PnL and equity against fresh marks.
    ///
    /// Equity counts cash-asset totals, spot position value at the mark and
    /// leveraged unrealized PnL; base-asset holdings of spot positions are
    /// represented by the marked position value.
    pub fn mark_to_market(&mut self, marks: &HashMap<String, Decimal>) -> Decimal {
        for (key, mark) in marks {
            self.last_marks.insert(key.clone(), *mark);
        }

        let mut equity: Decimal = self
            .cash_assets
            .iter()
            .map(|asset| self.ledger.total(asset))
            .sum();

        for (key, position) in self.positions.iter_mut() {
            let mark = self
                .last_marks
                .get(key)
                .copied()
                .unwrap_or(position.avg_entry_price);
            let unrealized = (mark - position.avg_entry_price) * position.quantity;
            let leveraged = self
                .specs
                .get(key)
                .map(|s| s.is_leveraged())
                .unwrap_or(false);
            equity += if leveraged {
                unrealized
            } else {
                position.quantity * mark
            };
            position.unrealized_pnl = unrealized;
        }

        self.last_equity = equity;
        self.peak_equity = self.peak_equity.max(equity);
        equity
    }

    /// Apply a funding charge to an instrument's position and quote balance.
    ///
    /// Positive charges debit (longs paying a positive rate), negative
    /// charges credit.
    pub fn apply_funding(
        &mut self,
        spec: &InstrumentSpec,
        rate: Decimal,
        charge: Decimal,
        now: DateTime<Utc>,
    ) -> EngineEvent {
        let key = spec.id.key();
        let quote = spec.id.quote_asset();
        if charge > Decimal::ZERO {
            self.ledger.debit(quote, charge);
        } else {
            self.ledger.credit(quote, -charge);
        }
        self.last_equity -= charge;
        let position = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| PaperPosition::flat(key.clone()));
        position.funding_paid += charge;
        self.funding_stamps.insert(key.clone(), now);

        EngineEvent::FundingApplied {
            ts: now,
            instrument: key,
            rate,
            charge,
            position_quantity: position.quantity,
        }
    }

    /// Serializable state for persistence
    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            balances: self.ledger.totals(),
            reserved: self.ledger.reservations(),
            positions: self.positions.clone(),
            funding_timestamps: self.funding_stamps.clone(),
            peak_equity: self.peak_equity,
        }
    }

    /// Replace state from a snapshot; absent fields fall back to zeroed
    pub fn restore(&mut self, snapshot: &PortfolioSnapshot) {
        let mut ledger = AssetLedger::new();
        for (asset, total) in &snapshot.balances {
            ledger.credit(asset, *total);
        }
        for (asset, reserved) in &snapshot.reserved {
            ledger.reserve(asset, *reserved);
        }
        self.ledger = ledger;
        self.positions = snapshot.positions.clone();
        self.funding_stamps = snapshot.funding_timestamps.clone();
        self.last_marks.clear();

        let cash: Decimal = self
            .cash_assets
            .iter()
            .map(|asset| self.ledger.total(asset))
            .sum();
        let held: Decimal = self
            .positions
            .iter()
            .map(|(key, p)| {
                let leveraged = self
                    .specs
                    .get(key)
                    .map(|s| s.is_leveraged())
                    .unwrap_or(false);
                if leveraged {
                    Decimal::ZERO
                } else {
                    p.quantity * p.avg_entry_price
                }
            })
            .sum();
        self.last_equity = cash + held;
        self.peak_equity = snapshot.peak_equity.max(self.last_equity);
    }

    fn mark_or_entry(&self, key: &str, position: &PaperPosition) -> Decimal {
        self.last_marks
            .get(key)
            .copied()
            .unwrap_or(position.avg_entry_price)
    }
}
