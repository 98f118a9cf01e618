//! Market data feed boundary
//!
//! Feeds are pulled synchronously inside the desk tick and must return
//! immediately from cache; no network I/O happens here. A feed error is
//! logged and the instrument skipped for that cycle, never propagated.

use crate::domain::{OrderBookSnapshot, PriceLevel};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// One market-data pull: the latest book and, when known, a funding rate
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    /// Fresh book snapshot
    pub book: OrderBookSnapshot,
    /// Current funding rate, for instruments that fund
    pub funding_rate: Option<Decimal>,
}

/// Non-blocking market data source for one instrument
pub trait MarketFeed {
    /// Latest update; must not block
    fn poll(&mut self, now: DateTime<Utc>) -> anyhow::Result<FeedUpdate>;
}

/// Scripted feed replaying a fixed sequence of updates.
///
/// After the script runs out the last update is served from cache.
#[derive(Debug, Default)]
pub struct ReplayFeed {
    updates: VecDeque<FeedUpdate>,
    last: Option<FeedUpdate>,
}

impl ReplayFeed {
    /// Feed over the given updates
    pub fn new(updates: impl IntoIterator<Item = FeedUpdate>) -> Self {
        Self {
            updates: updates.into_iter().collect(),
            last: None,
        }
    }

    /// Queue another update
    pub fn push(&mut self, update: FeedUpdate) {
        self.updates.push_back(update);
    }
}

impl MarketFeed for ReplayFeed {
    fn poll(&mut self, _now: DateTime<Utc>) -> anyhow::Result<FeedUpdate> {
        if let Some(update) = self.updates.pop_front() {
            self.last = Some(update.clone());
            return Ok(update);
        }
        self.last
            .clone()
            .ok_or_else(|| anyhow!("replay feed has no market data"))
    }
}

/// Seeded random-walk feed for demos and soak runs.
///
/// The mid price moves a few ticks per poll and a shallow symmetric book is
/// synthesized around it. Deterministic for a given seed.
#[derive(Debug)]
pub struct RandomWalkFeed {
    instrument: String,
    mid: Decimal,
    tick: Decimal,
    funding_rate: Decimal,
    rng: StdRng,
}

impl RandomWalkFeed {
    /// Feed walking around `mid` in steps of `tick`
    pub fn new(
        instrument: impl Into<String>,
        mid: Decimal,
        tick: Decimal,
        funding_rate: Decimal,
        seed: u64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            mid,
            tick,
            funding_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl MarketFeed for RandomWalkFeed {
    fn poll(&mut self, now: DateTime<Utc>) -> anyhow::Result<FeedUpdate> {
        let step: i64 = self.rng.gen_range(-3..=3);
        self.mid += Decimal::from(step) * self.tick;
        if self.mid <= self.tick {
            self.mid = self.tick * Decimal::from(10);
        }

        let mut book = OrderBookSnapshot::empty(self.instrument.clone(), now);
        for depth in 1..=3i64 {
            let offset = Decimal::from(depth) * self.tick;
            let bid_size = Decimal::from(self.rng.gen_range(1..=20i64));
            let ask_size = Decimal::from(self.rng.gen_range(1..=20i64));
            book.bids.push(PriceLevel {
                price: self.mid - offset,
                size: bid_size,
            });
            book.asks.push(PriceLevel {
                price: self.mid + offset,
                size: ask_size,
            });
        }

        Ok(FeedUpdate {
            book,
            funding_rate: Some(self.funding_rate),
        })
    }
}
