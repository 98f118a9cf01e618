//! Engine event vocabulary
//!
//! Events are constructed once at the moment of the underlying state
//! change, never mutated, and appended to a bounded ring buffer. They are
//! the only channel through which rejections and internal faults reach the
//! caller.

use crate::domain::{OrderId, OrderStatus, Side};
use crate::error::RejectReason;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How a fill changed a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTransition {
    /// Opened a fresh position
    Open,
    /// Grew the position in the same direction
    Add,
    /// Shrank the position without crossing zero
    Reduce,
    /// Brought the position to exactly zero
    Close,
    /// Closed the position and re-opened in the opposite direction
    Flip,
}

/// Timestamped, instrument-tagged engine event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Order passed validation and entered the latency queue
    OrderSubmitted {
        ts: DateTime<Utc>,
        instrument: String,
        order_id: OrderId,
        /// When the order becomes eligible to open
        activate_at: DateTime<Utc>,
    },
    /// Order left the latency queue and is resting on the book
    OrderAccepted {
        ts: DateTime<Utc>,
        instrument: String,
        order_id: OrderId,
        /// Time spent in the latency queue
        queue_delay_ms: i64,
    },
    /// Order refused; nothing was reserved or mutated
    OrderRejected {
        ts: DateTime<Utc>,
        instrument: String,
        /// Absent when the order never reached an engine
        order_id: Option<OrderId>,
        reason: RejectReason,
        source: String,
    },
    /// A fill executed against the order
    OrderFilled {
        ts: DateTime<Utc>,
        instrument: String,
        order_id: OrderId,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        is_maker: bool,
        fill_count: u32,
        remaining_quantity: Decimal,
        status: OrderStatus,
    },
    /// Order canceled; its remaining reservation was released
    OrderCanceled {
        ts: DateTime<Utc>,
        instrument: String,
        order_id: OrderId,
        remaining_quantity: Decimal,
    },
    /// Position state after a settled fill
    PositionChanged {
        ts: DateTime<Utc>,
        instrument: String,
        transition: FillTransition,
        quantity: Decimal,
        avg_entry_price: Decimal,
        /// Realized PnL attributed to this fill only
        realized_pnl: Decimal,
        /// Running realized PnL on the position
        total_realized_pnl: Decimal,
    },
    /// Funding charge settled against the quote balance
    FundingApplied {
        ts: DateTime<Utc>,
        instrument: String,
        rate: Decimal,
        charge: Decimal,
        position_quantity: Decimal,
    },
    /// Advisory notice: position margin eroded below maintenance
    LiquidationCandidate {
        ts: DateTime<Utc>,
        instrument: String,
        quantity: Decimal,
        mark_price: Decimal,
        margin_balance: Decimal,
        maintenance_margin: Decimal,
    },
    /// Internal fault caught at a public boundary
    EngineError {
        ts: DateTime<Utc>,
        instrument: String,
        context: String,
        message: String,
    },
}

impl EngineEvent {
    /// Event timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::OrderSubmitted { ts, .. }
            | EngineEvent::OrderAccepted { ts, .. }
            | EngineEvent::OrderRejected { ts, .. }
            | EngineEvent::OrderFilled { ts, .. }
            | EngineEvent::OrderCanceled { ts, .. }
            | EngineEvent::PositionChanged { ts, .. }
            | EngineEvent::FundingApplied { ts, .. }
            | EngineEvent::LiquidationCandidate { ts, .. }
            | EngineEvent::EngineError { ts, .. } => *ts,
        }
    }

    /// Instrument key the event belongs to
    pub fn instrument(&self) -> &str {
        match self {
            EngineEvent::OrderSubmitted { instrument, .. }
            | EngineEvent::OrderAccepted { instrument, .. }
            | EngineEvent::OrderRejected { instrument, .. }
            | EngineEvent::OrderFilled { instrument, .. }
            | EngineEvent::OrderCanceled { instrument, .. }
            | EngineEvent::PositionChanged { instrument, .. }
            | EngineEvent::FundingApplied { instrument, .. }
            | EngineEvent::LiquidationCandidate { instrument, .. }
            | EngineEvent::EngineError { instrument, .. } => instrument,
        }
    }

    /// Short label for logs and journal lines
    pub fn label(&self) -> &'static str {
        match self {
            EngineEvent::OrderSubmitted { .. } => "order_submitted",
            EngineEvent::OrderAccepted { .. } => "order_accepted",
            EngineEvent::OrderRejected { .. } => "order_rejected",
            EngineEvent::OrderFilled { .. } => "order_filled",
            EngineEvent::OrderCanceled { .. } => "order_canceled",
            EngineEvent::PositionChanged { .. } => "position_changed",
            EngineEvent::FundingApplied { .. } => "funding_applied",
            EngineEvent::LiquidationCandidate { .. } => "liquidation_candidate",
            EngineEvent::EngineError { .. } => "engine_error",
        }
    }

    /// Whether this event records an execution
    pub fn is_fill(&self) -> bool {
        matches!(self, EngineEvent::OrderFilled { .. })
    }
}

/// Bounded in-memory event ring buffer; oldest events are evicted first
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<EngineEvent>,
    capacity: usize,
}

impl EventLog {
    /// Create a log holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest when full
    pub fn push(&mut self, event: EngineEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate retained events, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &EngineEvent> {
        self.events.iter()
    }
}
