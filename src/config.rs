//! Configuration types for paper-desk

use crate::domain::InstrumentKind;
use crate::engine::EngineSettings;
use crate::risk::RiskLimits;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulate: SimulateConfig,
}

/// Starting capital
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    /// Initial balance per asset
    pub initial_balances: HashMap<String, Decimal>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_balances: HashMap::from([("USDT".to_string(), Decimal::from(10_000))]),
        }
    }
}

/// Matching engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_fills")]
    pub max_fills_per_order: u32,
    #[serde(default)]
    pub min_fill_interval_ms: i64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
    #[serde(default = "default_true")]
    pub reject_crossed_maker: bool,
    #[serde(default = "default_true")]
    pub respect_visible_depth: bool,
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
}

fn default_max_fills() -> u32 {
    16
}
fn default_retention_secs() -> i64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_leverage() -> Decimal {
    Decimal::from(5)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fills_per_order: 16,
            min_fill_interval_ms: 0,
            retention_secs: 300,
            reject_crossed_maker: true,
            respect_visible_depth: true,
            leverage: Decimal::from(5),
        }
    }
}

impl EngineConfig {
    /// Engine settings from this section
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            max_fills_per_order: self.max_fills_per_order,
            min_fill_interval_ms: self.min_fill_interval_ms,
            retention_secs: self.retention_secs,
            reject_crossed_maker: self.reject_crossed_maker,
            respect_visible_depth: self.respect_visible_depth,
            leverage: self.leverage,
        }
    }
}

/// Simulated order-entry latency
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatencyConfig {
    /// Insertion delay in milliseconds
    #[serde(default)]
    pub insert_ms: u64,
}

/// Snapshot persistence
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Where to persist state; disabled when absent
    pub path: Option<PathBuf>,
    #[serde(default = "default_snapshot_interval")]
    pub interval_secs: i64,
}

fn default_snapshot_interval() -> i64 {
    30
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_secs: 30,
        }
    }
}

/// Durable fill journal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JournalConfig {
    /// Journal file; disabled when absent
    pub path: Option<PathBuf>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Demo simulation parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SimulateConfig {
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_venue")]
    pub venue: String,
    #[serde(default = "default_pair")]
    pub pair: String,
    #[serde(default = "default_kind")]
    pub kind: InstrumentKind,
    #[serde(default = "default_start_mid")]
    pub start_mid: Decimal,
    #[serde(default = "default_price_tick")]
    pub price_tick: Decimal,
    #[serde(default = "default_order_quantity")]
    pub order_quantity: Decimal,
    #[serde(default = "default_funding_rate")]
    pub funding_rate: Decimal,
}

fn default_steps() -> u32 {
    120
}
fn default_seed() -> u64 {
    42
}
fn default_venue() -> String {
    "binance".to_string()
}
fn default_pair() -> String {
    "BTC/USDT".to_string()
}
fn default_kind() -> InstrumentKind {
    InstrumentKind::Perpetual
}
fn default_start_mid() -> Decimal {
    Decimal::from(100)
}
fn default_price_tick() -> Decimal {
    Decimal::new(5, 1)
}
fn default_order_quantity() -> Decimal {
    Decimal::ONE
}
fn default_funding_rate() -> Decimal {
    Decimal::new(1, 4)
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            seed: default_seed(),
            venue: default_venue(),
            pair: default_pair(),
            kind: default_kind(),
            start_mid: default_start_mid(),
            price_tick: default_price_tick(),
            order_quantity: default_order_quantity(),
            funding_rate: default_funding_rate(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
