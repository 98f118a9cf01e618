//! Paper desk orchestrator
//!
//! Owns the single portfolio and one matching engine per instrument and
//! drives the per-tick cycle: feed pull, engine tick, funding,
//! mark-to-market, advisory risk scan, throttled snapshot, journal, event
//! log. Single-threaded and not reentrant; exactly one driver calls
//! [`PaperDesk::tick`].

mod feed;
mod funding;
mod journal;

pub use feed::{FeedUpdate, MarketFeed, RandomWalkFeed, ReplayFeed};
pub use funding::{FundingSimulator, IntervalFundingSimulator};
pub use journal::{EventJournal, JsonlJournal};

use crate::domain::{
    EngineEvent, EventLog, InstrumentSpec, OrderId, OrderType, Side,
};
use crate::engine::{
    EngineSettings, FeeModel, FillModel, LatencyModel, MatchingEngine, PaperStats,
};
use crate::error::RejectReason;
use crate::portfolio::{PaperPortfolio, PortfolioSnapshot, StateStore};
use crate::risk::{maintenance_breach, RiskLimits};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

const DEFAULT_EVENT_CAPACITY: usize = 4096;
const DEFAULT_SNAPSHOT_INTERVAL_SECS: i64 = 30;

struct EngineSlot {
    key: String,
    engine: MatchingEngine,
    feed: Box<dyn MarketFeed>,
}

/// Top-level simulated exchange: one portfolio, many engines
pub struct PaperDesk {
    portfolio: PaperPortfolio,
    /// Registration order; ticks walk this front to back
    engines: Vec<EngineSlot>,
    index: HashMap<String, usize>,
    funding: Box<dyn FundingSimulator>,
    store: Option<Box<dyn StateStore>>,
    journal: Option<Box<dyn EventJournal>>,
    event_log: EventLog,
    snapshot_interval_secs: i64,
    last_snapshot_at: Option<DateTime<Utc>>,
}

impl PaperDesk {
    /// Desk over a fresh portfolio
    pub fn new(initial_balances: &HashMap<String, Decimal>, limits: RiskLimits) -> Self {
        Self {
            portfolio: PaperPortfolio::new(initial_balances, limits),
            engines: Vec::new(),
            index: HashMap::new(),
            funding: Box::new(IntervalFundingSimulator::new()),
            store: None,
            journal: None,
            event_log: EventLog::new(DEFAULT_EVENT_CAPACITY),
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            last_snapshot_at: None,
        }
    }

    /// Swap the funding simulator
    pub fn set_funding(&mut self, funding: Box<dyn FundingSimulator>) {
        self.funding = funding;
    }

    /// Attach a snapshot store; [`PaperDesk::restore_from_store`] reads it
    pub fn set_state_store(&mut self, store: Box<dyn StateStore>) {
        self.store = Some(store);
    }

    /// Attach a durable fill journal
    pub fn set_journal(&mut self, journal: Box<dyn EventJournal>) {
        self.journal = Some(journal);
    }

    /// Throttle interval between persisted snapshots
    pub fn set_snapshot_interval_secs(&mut self, secs: i64) {
        self.snapshot_interval_secs = secs.max(0);
    }

    /// Wire a fresh engine for an instrument with its models and feed
    pub fn register_instrument(
        &mut self,
        spec: InstrumentSpec,
        settings: EngineSettings,
        feed: Box<dyn MarketFeed>,
        fill_model: Box<dyn FillModel>,
        fee_model: Box<dyn FeeModel>,
        latency: Box<dyn LatencyModel>,
    ) {
        let key = spec.id.key();
        self.portfolio.register_instrument(spec.clone());
        let engine = MatchingEngine::new(spec, settings, fill_model, fee_model, latency);
        self.index.insert(key.clone(), self.engines.len());
        tracing::info!(instrument = %key, "Instrument registered");
        self.engines.push(EngineSlot { key, engine, feed });
    }

    /// Registered instrument keys in registration order
    pub fn instrument_keys(&self) -> Vec<String> {
        self.engines.iter().map(|slot| slot.key.clone()).collect()
    }

    /// Read access to the shared portfolio
    pub fn portfolio(&self) -> &PaperPortfolio {
        &self.portfolio
    }

    /// Bounded in-memory event history
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Load the stored snapshot into the portfolio, if one exists.
    ///
    /// Call after registering instruments. Missing or corrupt state starts
    /// the desk from its seeded balances instead of failing.
    pub fn restore_from_store(&mut self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.load() {
            Ok(Some(snapshot)) => {
                self.portfolio.restore(&snapshot);
                tracing::info!("Portfolio state restored from snapshot");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot load failed, starting fresh");
                false
            }
        }
    }

    /// Route an order to its engine.
    ///
    /// Unknown instruments produce an `OrderRejected` event, never an error.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_order(
        &mut self,
        instrument: &str,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
        source: &str,
        now: Option<DateTime<Utc>>,
    ) -> EngineEvent {
        let now = now.unwrap_or_else(Utc::now);
        let event = match self.index.get(instrument) {
            Some(&slot) => self.engines[slot].engine.submit_order(
                &mut self.portfolio,
                side,
                order_type,
                price,
                quantity,
                source,
                now,
            ),
            None => {
                tracing::warn!(instrument, "Order for unregistered instrument");
                EngineEvent::OrderRejected {
                    ts: now,
                    instrument: instrument.to_string(),
                    order_id: None,
                    reason: RejectReason::UnknownInstrument {
                        key: instrument.to_string(),
                    },
                    source: source.to_string(),
                }
            }
        };
        self.event_log.push(event.clone());
        event
    }

    /// Cancel one order; `None` for unknown instruments, orders or
    /// already-terminal orders
    pub fn cancel_order(
        &mut self,
        instrument: &str,
        order_id: OrderId,
        now: Option<DateTime<Utc>>,
    ) -> Option<EngineEvent> {
        let now = now.unwrap_or_else(Utc::now);
        let slot = *self.index.get(instrument)?;
        let event = self.engines[slot]
            .engine
            .cancel_order(&mut self.portfolio, order_id, now)?;
        self.event_log.push(event.clone());
        Some(event)
    }

    /// Cancel all open orders, optionally for one instrument only
    pub fn cancel_all(
        &mut self,
        instrument: Option<&str>,
        now: Option<DateTime<Utc>>,
    ) -> Vec<EngineEvent> {
        let now = now.unwrap_or_else(Utc::now);
        let mut events = Vec::new();
        for slot in &mut self.engines {
            if instrument.is_some_and(|key| key != slot.key) {
                continue;
            }
            events.extend(slot.engine.cancel_all(&mut self.portfolio, now));
        }
        for event in &events {
            self.event_log.push(event.clone());
        }
        events
    }

    /// Drive one full cycle and return every event it produced
    pub fn tick(&mut self, now: Option<DateTime<Utc>>) -> Vec<EngineEvent> {
        let now = now.unwrap_or_else(Utc::now);
        let mut events = Vec::new();
        let mut marks: HashMap<String, Decimal> = HashMap::new();
        let mut funding_inputs: HashMap<String, (InstrumentSpec, Decimal)> = HashMap::new();

        // Book update + engine tick, in registration order
        for slot in &mut self.engines {
            match slot.feed.poll(now) {
                Ok(update) => {
                    if let Some(mid) = update.book.mid_price() {
                        marks.insert(slot.key.clone(), mid);
                    }
                    if let Some(rate) = update.funding_rate {
                        funding_inputs
                            .insert(slot.key.clone(), (slot.engine.spec().clone(), rate));
                    }
                    slot.engine.update_book(update.book);
                }
                Err(e) => {
                    tracing::warn!(instrument = %slot.key, error = %e, "Feed error, skipped");
                }
            }
            events.extend(slot.engine.tick(&mut self.portfolio, now));
        }

        // Funding after all engines have ticked
        events.extend(
            self.funding
                .tick(now, &mut self.portfolio, &funding_inputs, &marks),
        );

        // Mark to market with the freshest prices of this cycle
        let equity = self.portfolio.mark_to_market(&marks);
        crate::telemetry::set_gauge(
            crate::telemetry::GaugeMetric::Equity,
            equity.to_f64().unwrap_or(0.0),
        );
        crate::telemetry::set_gauge(
            crate::telemetry::GaugeMetric::OpenPositions,
            self.portfolio.positions().filter(|p| !p.is_flat()).count() as f64,
        );

        // Advisory post-trade evaluation; notices only, no force-close
        for slot in &self.engines {
            let Some(position) = self.portfolio.position(&slot.key) else {
                continue;
            };
            let Some(mark) = marks.get(&slot.key) else {
                continue;
            };
            if let Some(breach) = maintenance_breach(
                position,
                slot.engine.spec(),
                slot.engine.settings().leverage,
                *mark,
            ) {
                events.push(EngineEvent::LiquidationCandidate {
                    ts: now,
                    instrument: slot.key.clone(),
                    quantity: position.quantity,
                    mark_price: *mark,
                    margin_balance: breach.margin_balance,
                    maintenance_margin: breach.maintenance_margin,
                });
            }
        }

        self.persist_snapshot(now);

        if let Some(journal) = &mut self.journal {
            for event in events.iter().filter(|e| e.is_fill()) {
                if let Err(e) = journal.append(event) {
                    tracing::warn!(error = %e, "Journal append failed");
                }
            }
        }

        for event in &events {
            self.event_log.push(event.clone());
        }
        events
    }

    /// Serializable portfolio state
    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.portfolio.snapshot()
    }

    /// Execution counters, for one instrument or merged across the desk
    pub fn paper_stats(&self, instrument: Option<&str>) -> PaperStats {
        match instrument {
            Some(key) => self
                .index
                .get(key)
                .map(|&slot| self.engines[slot].engine.stats().clone())
                .unwrap_or_default(),
            None => {
                let mut merged = PaperStats::default();
                for slot in &self.engines {
                    merged.merge(slot.engine.stats());
                }
                merged
            }
        }
    }

    fn persist_snapshot(&mut self, now: DateTime<Utc>) {
        let Some(store) = &mut self.store else {
            return;
        };
        let due = match self.last_snapshot_at {
            None => true,
            Some(last) => now - last >= Duration::seconds(self.snapshot_interval_secs),
        };
        if !due {
            return;
        }
        if let Err(e) = store.save(&self.portfolio.snapshot()) {
            tracing::warn!(error = %e, "Snapshot persist failed");
        } else {
            self.last_snapshot_at = Some(now);
        }
    }
}
