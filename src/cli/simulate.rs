//! Simulate command implementation

use crate::config::Config;
use crate::desk::{JsonlJournal, PaperDesk, RandomWalkFeed};
use crate::domain::{InstrumentId, OrderType, Side};
use crate::engine::{FixedLatencyModel, SpecFeeModel, TopOfBookFillModel};
use crate::portfolio::JsonFileStore;
use chrono::{Duration, Utc};
use clap::Args;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of ticks to run (overrides config)
    #[arg(long)]
    pub steps: Option<u32>,

    /// Random-walk seed (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SimulateArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let sim = &config.simulate;
        let steps = self.steps.unwrap_or(sim.steps);
        let seed = self.seed.unwrap_or(sim.seed);

        let id = InstrumentId::new(sim.venue.clone(), sim.pair.clone(), sim.kind);
        let mut spec = crate::domain::InstrumentSpec::new(id);
        spec.price_increment = sim.price_tick;

        let mut desk = PaperDesk::new(&config.portfolio.initial_balances, config.risk.clone());
        if let Some(path) = &config.snapshot.path {
            desk.set_state_store(Box::new(JsonFileStore::new(path)));
            desk.set_snapshot_interval_secs(config.snapshot.interval_secs);
        }
        if let Some(path) = &config.journal.path {
            desk.set_journal(Box::new(JsonlJournal::open(path)?));
        }

        let key = spec.id.key();
        let feed = RandomWalkFeed::new(
            key.clone(),
            sim.start_mid,
            sim.price_tick,
            sim.funding_rate,
            seed,
        );
        desk.register_instrument(
            spec.clone(),
            config.engine.settings(),
            Box::new(feed),
            Box::new(TopOfBookFillModel::new()),
            Box::new(SpecFeeModel::from_spec(&spec)),
            Box::new(FixedLatencyModel::from_millis(config.latency.insert_ms)),
        );
        desk.restore_from_store();

        tracing::info!(instrument = %key, steps, seed, "Starting paper session");

        // Scripted driver: alternate market buys and sells so every part of
        // the fill/settlement path gets exercised.
        let start = Utc::now();
        let mut fills = 0usize;
        for step in 0..steps {
            let now = start + Duration::seconds(step as i64);
            if step % 10 == 3 {
                desk.submit_order(
                    &key,
                    Side::Buy,
                    OrderType::Market,
                    None,
                    sim.order_quantity,
                    "simulate",
                    Some(now),
                );
            } else if step % 10 == 8 {
                desk.submit_order(
                    &key,
                    Side::Sell,
                    OrderType::Market,
                    None,
                    sim.order_quantity,
                    "simulate",
                    Some(now),
                );
            }
            let events = desk.tick(Some(now));
            fills += events.iter().filter(|e| e.is_fill()).count();
        }

        let stats = desk.paper_stats(Some(&key));
        let position = desk.portfolio().position(&key);
        println!("Session complete after {} ticks", steps);
        println!("  Equity:     {}", desk.portfolio().equity());
        println!("  Peak:       {}", desk.portfolio().peak_equity());
        println!(
            "  Fills:      {} ({} events), rejects {}",
            stats.fill_count, fills, stats.reject_count
        );
        println!("  Avg queue:  {:.1} ms", stats.avg_queue_delay_ms());
        if let Some(position) = position {
            println!(
                "  Position:   {} @ {} (realized {}, fees {}, funding {})",
                position.quantity,
                position.avg_entry_price,
                position.realized_pnl,
                position.fees_paid,
                position.funding_paid
            );
        }
        Ok(())
    }
}
