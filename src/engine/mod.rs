//! Order matching engine
//!
//! One engine per instrument. Owns the order lifecycle from validation and
//! reservation through latency-queued acceptance, matching against
//! pluggable models, settlement via the portfolio and terminal pruning.
//!
//! Public methods never propagate errors or panics to the caller: expected
//! refusals come back as `OrderRejected` events and faults inside injected
//! models are caught and converted to `EngineError` events so the tick loop
//! always survives.

mod depth;
mod models;

pub use depth::DepthLedger;
pub use models::{
    consume_depth, FeeModel, FillDecision, FillModel, FixedLatencyModel, LatencyModel,
    SpecFeeModel, TopOfBookFillModel,
};

use crate::accounting::dust_epsilon;
use crate::domain::{
    EngineEvent, InstrumentSpec, OrderBookSnapshot, OrderId, OrderStatus, OrderType, PaperOrder,
    Reservation, Side,
};
use crate::error::RejectReason;
use crate::portfolio::PaperPortfolio;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use uuid::Uuid;

/// Per-engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum fills per order (zero = unlimited)
    pub max_fills_per_order: u32,
    /// Minimum time between fills on the same order
    pub min_fill_interval_ms: i64,
    /// How long terminal orders stay queryable before pruning
    pub retention_secs: i64,
    /// Reject post-only orders that would cross, instead of tagging them
    pub reject_crossed_maker: bool,
    /// Clamp fills against the per-tick visible-depth ledger
    pub respect_visible_depth: bool,
    /// Account leverage for margin instruments
    pub leverage: Decimal,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_fills_per_order: 16,
            min_fill_interval_ms: 0,
            retention_secs: 300,
            reject_crossed_maker: true,
            respect_visible_depth: true,
            leverage: Decimal::ONE,
        }
    }
}

/// Execution counters for one engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaperStats {
    /// Fills executed
    pub fill_count: u64,
    /// Orders rejected
    pub reject_count: u64,
    /// Orders accepted onto the book
    pub accepted_count: u64,
    /// Total latency-queue delay across accepted orders
    pub queue_delay_ms_total: i64,
}

impl PaperStats {
    /// Mean latency-queue delay in milliseconds
    pub fn avg_queue_delay_ms(&self) -> f64 {
        if self.accepted_count == 0 {
            0.0
        } else {
            self.queue_delay_ms_total as f64 / self.accepted_count as f64
        }
    }

    /// Fold another engine's counters into this one
    pub fn merge(&mut self, other: &PaperStats) {
        self.fill_count += other.fill_count;
        self.reject_count += other.reject_count;
        self.accepted_count += other.accepted_count;
        self.queue_delay_ms_total += other.queue_delay_ms_total;
    }
}

enum SubmitError {
    Reject(RejectReason),
    Fault { context: String, message: String },
}

impl From<RejectReason> for SubmitError {
    fn from(reason: RejectReason) -> Self {
        SubmitError::Reject(reason)
    }
}

/// Matching engine for one instrument
pub struct MatchingEngine {
    spec: InstrumentSpec,
    key: String,
    settings: EngineSettings,
    fill_model: Box<dyn FillModel>,
    fee_model: Box<dyn FeeModel>,
    latency: Box<dyn LatencyModel>,
    orders: HashMap<OrderId, PaperOrder>,
    /// Submission order; matching iterates this, not price priority
    order_seq: Vec<OrderId>,
    book: OrderBookSnapshot,
    depth: DepthLedger,
    stats: PaperStats,
}

impl MatchingEngine {
    /// Engine for the given instrument and models
    pub fn new(
        spec: InstrumentSpec,
        settings: EngineSettings,
        fill_model: Box<dyn FillModel>,
        fee_model: Box<dyn FeeModel>,
        latency: Box<dyn LatencyModel>,
    ) -> Self {
        let key = spec.id.key();
        let book = OrderBookSnapshot::empty(key.clone(), Utc::now());
        Self {
            spec,
            key,
            settings,
            fill_model,
            fee_model,
            latency,
            orders: HashMap::new(),
            order_seq: Vec::new(),
            book,
            depth: DepthLedger::new(),
            stats: PaperStats::default(),
        }
    }

    /// Instrument rules this engine trades
    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    /// Execution counters
    pub fn stats(&self) -> &PaperStats {
        &self.stats
    }

    /// Engine tuning knobs
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Look up an order by id
    pub fn order(&self, id: &OrderId) -> Option<&PaperOrder> {
        self.orders.get(id)
    }

    /// Ids of orders that are not yet terminal, in submission order
    pub fn open_order_ids(&self) -> Vec<OrderId> {
        self.order_seq
            .iter()
            .filter(|id| self.orders.get(id).map(|o| !o.is_terminal()).unwrap_or(false))
            .copied()
            .collect()
    }

    /// Install the latest book snapshot
    pub fn update_book(&mut self, book: OrderBookSnapshot) {
        self.book = book;
    }

    /// Latest installed book
    pub fn book(&self) -> &OrderBookSnapshot {
        &self.book
    }

    /// Validate, reserve and queue (or immediately open) a new order.
    ///
    /// Always returns an event; failures are `OrderRejected` or
    /// `EngineError`, never an `Err` or a panic.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_order(
        &mut self,
        portfolio: &mut PaperPortfolio,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
        source: &str,
        now: DateTime<Utc>,
    ) -> EngineEvent {
        match self.try_submit(portfolio, side, order_type, price, quantity, source, now) {
            Ok(event) => event,
            Err(SubmitError::Reject(reason)) => {
                self.stats.reject_count += 1;
                crate::telemetry::count_reject();
                tracing::warn!(
                    instrument = %self.key,
                    %reason,
                    "Order rejected"
                );
                EngineEvent::OrderRejected {
                    ts: now,
                    instrument: self.key.clone(),
                    order_id: None,
                    reason,
                    source: source.to_string(),
                }
            }
            Err(SubmitError::Fault { context, message }) => {
                self.engine_fault(&context, &message, now)
            }
        }
    }

    /// Drive the engine one step: promote due orders out of the latency
    /// queue, match open orders against the book, prune expired terminals.
    ///
    /// Orders are matched in submission order; this is deliberately not
    /// price-time priority.
    pub fn tick(&mut self, portfolio: &mut PaperPortfolio, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let ids = self.order_seq.clone();

        // Promote latency-queue entries that are due
        for id in &ids {
            let Some(order) = self.orders.get_mut(id) else {
                continue;
            };
            if order.status != OrderStatus::PendingSubmit || order.activate_at > now {
                continue;
            }
            match order.set_status(OrderStatus::Open, now) {
                Ok(()) => {
                    let delay_ms = (now - order.submitted_at).num_milliseconds().max(0);
                    let event = EngineEvent::OrderAccepted {
                        ts: now,
                        instrument: self.key.clone(),
                        order_id: order.id,
                        queue_delay_ms: delay_ms,
                    };
                    self.stats.accepted_count += 1;
                    self.stats.queue_delay_ms_total += delay_ms;
                    events.push(event);
                }
                Err(e) => events.push(self.engine_fault("promotion", &e.to_string(), now)),
            }
        }

        // Match open orders; visible depth is shared across them per tick
        self.depth.reset();
        for id in &ids {
            if let Some(event_batch) = self.match_one(portfolio, id, now) {
                events.extend(event_batch);
            }
        }

        self.prune_terminal(now);
        events
    }

    /// Cancel one order, releasing its remaining reservation.
    ///
    /// Unknown or already-terminal orders return `None`.
    pub fn cancel_order(
        &mut self,
        portfolio: &mut PaperPortfolio,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Option<EngineEvent> {
        let order = self.orders.get_mut(&id)?;
        if order.is_terminal() {
            return None;
        }
        if let Err(e) = order.set_status(OrderStatus::Canceled, now) {
            return Some(self.engine_fault("cancel", &e.to_string(), now));
        }
        let remaining_quantity = order.remaining_quantity();
        let released = order
            .reservation
            .as_mut()
            .map(|res| (res.asset.clone(), res.take_all()));
        if let Some((asset, amount)) = released {
            portfolio.release(&asset, amount);
        }
        tracing::info!(instrument = %self.key, order_id = %id, "Order canceled");
        Some(EngineEvent::OrderCanceled {
            ts: now,
            instrument: self.key.clone(),
            order_id: id,
            remaining_quantity,
        })
    }

    /// Cancel every non-terminal order
    pub fn cancel_all(
        &mut self,
        portfolio: &mut PaperPortfolio,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        self.open_order_ids()
            .into_iter()
            .filter_map(|id| self.cancel_order(portfolio, id, now))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn try_submit(
        &mut self,
        portfolio: &mut PaperPortfolio,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<EngineEvent, SubmitError> {
        let raw_price = match (order_type, price) {
            (OrderType::Market, _) => match side {
                Side::Buy => self.book.best_ask(),
                Side::Sell => self.book.best_bid(),
            }
            .or_else(|| self.book.mid_price())
            .ok_or(RejectReason::NoMarketPrice)?,
            (_, Some(p)) => p,
            (_, None) => return Err(RejectReason::PriceNotPositive.into()),
        };
        let price = self.spec.quantize_price(raw_price, side);
        let quantity = self.spec.quantize_quantity(quantity);
        self.spec.validate(price, quantity)?;

        let mut crossed = false;
        if order_type == OrderType::LimitMaker {
            let opposite = match side {
                Side::Buy => self.book.best_ask(),
                Side::Sell => self.book.best_bid(),
            };
            if let Some(opposite) = opposite {
                let crossing = match side {
                    Side::Buy => opposite <= price,
                    Side::Sell => opposite >= price,
                };
                if crossing {
                    if self.settings.reject_crossed_maker {
                        return Err(RejectReason::MakerWouldCross { opposite }.into());
                    }
                    crossed = true;
                }
            }
        }

        let reservation = self.compute_reservation(side, price, quantity);
        if !portfolio.can_reserve(&reservation.asset, reservation.amount) {
            return Err(RejectReason::InsufficientBalance {
                available: portfolio.ledger().available(&reservation.asset),
                required: reservation.amount,
                asset: reservation.asset,
            }
            .into());
        }
        portfolio.pre_trade_check(&self.key, side, quantity, price)?;

        let delay_ns = catch_unwind(AssertUnwindSafe(|| self.latency.total_insert_ns()))
            .map_err(|p| SubmitError::Fault {
                context: "latency_model".to_string(),
                message: panic_message(p),
            })?;

        portfolio.reserve(&reservation.asset, reservation.amount);
        let activate_at = now + Duration::nanoseconds(delay_ns as i64);
        let mut order = PaperOrder {
            id: Uuid::new_v4(),
            instrument: self.spec.id.clone(),
            side,
            order_type,
            price,
            quantity,
            status: OrderStatus::PendingSubmit,
            filled_quantity: Decimal::ZERO,
            filled_notional: Decimal::ZERO,
            fee_paid: Decimal::ZERO,
            fill_count: 0,
            crossed,
            source: source.to_string(),
            submitted_at: now,
            activate_at,
            last_fill_at: None,
            closed_at: None,
            reservation: Some(reservation),
        };

        let event = if delay_ns == 0 {
            order
                .set_status(OrderStatus::Open, now)
                .map_err(|e| SubmitError::Fault {
                    context: "submit".to_string(),
                    message: e.to_string(),
                })?;
            self.stats.accepted_count += 1;
            EngineEvent::OrderAccepted {
                ts: now,
                instrument: self.key.clone(),
                order_id: order.id,
                queue_delay_ms: 0,
            }
        } else {
            EngineEvent::OrderSubmitted {
                ts: now,
                instrument: self.key.clone(),
                order_id: order.id,
                activate_at,
            }
        };

        tracing::info!(
            instrument = %self.key,
            order_id = %order.id,
            ?side,
            ?order_type,
            %price,
            %quantity,
            "Order submitted"
        );
        self.order_seq.push(order.id);
        self.orders.insert(order.id, order);
        Ok(event)
    }

    /// Reservation per instrument kind: spot buys hold quote notional, spot
    /// sells hold base quantity, margin instruments hold initial margin.
    fn compute_reservation(&self, side: Side, price: Decimal, quantity: Decimal) -> Reservation {
        let notional = price * quantity;
        if self.spec.is_leveraged() {
            let leverage = self
                .settings
                .leverage
                .max(Decimal::ONE)
                .min(self.spec.max_leverage.max(Decimal::ONE));
            let margin = notional / leverage * self.spec.margin_init_ratio;
            Reservation::new(self.spec.id.quote_asset(), margin)
        } else {
            match side {
                Side::Buy => Reservation::new(self.spec.id.quote_asset(), notional),
                Side::Sell => Reservation::new(self.spec.id.base_asset(), quantity),
            }
        }
    }

    fn match_one(
        &mut self,
        portfolio: &mut PaperPortfolio,
        id: &OrderId,
        now: DateTime<Utc>,
    ) -> Option<Vec<EngineEvent>> {
        let snapshot = {
            let order = self.orders.get(id)?;
            if !order.status.is_matchable() {
                return None;
            }
            if self.settings.max_fills_per_order > 0
                && order.fill_count >= self.settings.max_fills_per_order
            {
                return None;
            }
            if self.settings.min_fill_interval_ms > 0 {
                if let Some(last) = order.last_fill_at {
                    if (now - last).num_milliseconds() < self.settings.min_fill_interval_ms {
                        return None;
                    }
                }
            }
            order.clone()
        };

        let decision = match catch_unwind(AssertUnwindSafe(|| {
            self.fill_model.evaluate(&snapshot, &self.book, now)
        })) {
            Ok(decision) => decision,
            Err(p) => {
                return Some(vec![self.engine_fault("fill_model", &panic_message(p), now)]);
            }
        };
        if !decision.is_fill() || decision.price <= Decimal::ZERO {
            return None;
        }

        let mut quantity = decision.quantity.min(snapshot.remaining_quantity());
        if self.settings.respect_visible_depth {
            let limit = match snapshot.order_type {
                OrderType::Market => None,
                _ => Some(snapshot.price),
            };
            quantity = self.depth.clamp(&self.book, snapshot.side, limit, quantity);
        }
        if quantity <= Decimal::ZERO {
            return None;
        }

        let notional = quantity * decision.price;
        let fee = match catch_unwind(AssertUnwindSafe(|| {
            self.fee_model.compute(notional, decision.is_maker)
        })) {
            Ok(fee) => fee.max(Decimal::ZERO),
            Err(p) => {
                return Some(vec![self.engine_fault("fee_model", &panic_message(p), now)]);
            }
        };

        let outcome = portfolio.settle_fill(&self.spec, snapshot.side, quantity, decision.price, fee, now);

        let mut events = Vec::with_capacity(2);
        let order = self.orders.get_mut(id)?;
        order.filled_quantity += quantity;
        order.filled_notional += notional;
        order.fee_paid += fee;
        order.fill_count += 1;
        order.last_fill_at = Some(now);

        let terminal = order.remaining_quantity() <= dust_epsilon();
        let share = order
            .reservation
            .as_ref()
            .map(|res| {
                if order.quantity > Decimal::ZERO {
                    res.amount * quantity / order.quantity
                } else {
                    Decimal::ZERO
                }
            })
            .unwrap_or_default();
        let released = order.reservation.as_mut().map(|res| {
            let mut amount = res.take(share);
            if terminal {
                amount += res.take_all();
            }
            (res.asset.clone(), amount)
        });

        let to_status = if terminal {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if let Err(e) = order.set_status(to_status, now) {
            let message = e.to_string();
            return Some(vec![self.engine_fault("fill_transition", &message, now)]);
        }

        let fill_event = EngineEvent::OrderFilled {
            ts: now,
            instrument: self.key.clone(),
            order_id: order.id,
            side: order.side,
            quantity,
            price: decision.price,
            fee,
            is_maker: decision.is_maker,
            fill_count: order.fill_count,
            remaining_quantity: order.remaining_quantity(),
            status: order.status,
        };
        tracing::info!(
            instrument = %self.key,
            order_id = %id,
            %quantity,
            price = %decision.price,
            maker = decision.is_maker,
            "Order filled"
        );

        if let Some((asset, amount)) = released {
            portfolio.release(&asset, amount);
        }
        self.stats.fill_count += 1;
        crate::telemetry::count_fill();

        events.push(fill_event);
        events.push(EngineEvent::PositionChanged {
            ts: now,
            instrument: self.key.clone(),
            transition: outcome.transition,
            quantity: outcome.position.quantity,
            avg_entry_price: outcome.position.avg_entry_price,
            realized_pnl: outcome.realized_pnl,
            total_realized_pnl: outcome.position.realized_pnl,
        });
        Some(events)
    }

    fn prune_terminal(&mut self, now: DateTime<Utc>) {
        if self.settings.retention_secs <= 0 {
            return;
        }
        let cutoff = now - Duration::seconds(self.settings.retention_secs);
        let expired: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_terminal() && o.closed_at.is_some_and(|t| t < cutoff))
            .map(|o| o.id)
            .collect();
        if expired.is_empty() {
            return;
        }
        for id in &expired {
            self.orders.remove(id);
        }
        self.order_seq.retain(|id| self.orders.contains_key(id));
    }

    fn engine_fault(&self, context: &str, message: &str, now: DateTime<Utc>) -> EngineEvent {
        tracing::error!(
            instrument = %self.key,
            context,
            message,
            "Engine fault contained"
        );
        EngineEvent::EngineError {
            ts: now,
            instrument: self.key.clone(),
            context: context.to_string(),
            message: message.to_string(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
