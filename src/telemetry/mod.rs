//! Telemetry module
//!
//! Structured logging and the metrics facade.

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{count_fill, count_reject, set_gauge, GaugeMetric};

use crate::config::TelemetryConfig;

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level)?;
    Ok(())
}
