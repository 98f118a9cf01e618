//! Metrics facade
//!
//! Counters and gauges go through the `metrics` crate; whether anything
//! listens is up to the embedding application.

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Open position count
    OpenPositions,
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::Equity => "paper_desk_equity",
        GaugeMetric::OpenPositions => "paper_desk_open_positions",
    };
    metrics::gauge!(name).set(value);
}

/// Count one executed fill
pub fn count_fill() {
    metrics::counter!("paper_desk_fills_total").increment(1);
}

/// Count one rejected order
pub fn count_reject() {
    metrics::counter!("paper_desk_rejects_total").increment(1);
}
