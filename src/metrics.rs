//! Prometheus metrics collection for factionrelay.
//!
//! - `relay_polls_total{kind,outcome}` - Feed polls by feed kind and result
//! - `relay_cycle_duration_seconds` - Wall time of a whole poll cycle
//! - `relay_items_total` - Feed items relayed
//! - `relay_lines_sent_total` - Lines handed to channels
//! - `relay_confirmations_total{result}` - Embedded registration confirms
//! - `relay_monitored_feeds` - Feeds currently monitored

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Feed polls by feed kind and outcome (`ok` or an error code).
pub static POLLS: OnceLock<IntCounterVec> = OnceLock::new();

/// Feed items relayed to channels.
pub static ITEMS_RELAYED: OnceLock<IntCounter> = OnceLock::new();

/// Display lines sent, counted once per channel.
pub static LINES_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Registration confirmations by result.
pub static CONFIRMATIONS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges and histograms
// ========================================================================

pub static MONITORED_FEEDS: OnceLock<IntGauge> = OnceLock::new();

pub static CYCLE_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Recording before `init` is a no-op, so tests never need to call it.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, metric = stringify!($metric), "Failed to register metric");
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, metric = stringify!($metric), "Failed to create metric");
                }
            }
        };
    }

    register!(POLLS, IntCounterVec::new(Opts::new("relay_polls_total", "Feed polls by kind and outcome"), &["kind", "outcome"]));
    register!(ITEMS_RELAYED, IntCounter::new("relay_items_total", "Feed items relayed"));
    register!(LINES_SENT, IntCounter::new("relay_lines_sent_total", "Lines sent to channels"));
    register!(CONFIRMATIONS, IntCounterVec::new(Opts::new("relay_confirmations_total", "Registration confirmations by result"), &["result"]));
    register!(MONITORED_FEEDS, IntGauge::new("relay_monitored_feeds", "Feeds currently monitored"));
    register!(CYCLE_DURATION, Histogram::with_opts(
        HistogramOpts::new("relay_cycle_duration_seconds", "Poll cycle wall time")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
pub fn record_poll(kind: &str, outcome: &str) {
    if let Some(c) = POLLS.get() {
        c.with_label_values(&[kind, outcome]).inc();
    }
}

#[inline]
pub fn record_cycle(duration_secs: f64) {
    if let Some(h) = CYCLE_DURATION.get() {
        h.observe(duration_secs);
    }
}

/// Record `items` relayed in one line to `channels` channels.
#[inline]
pub fn record_relayed(items: usize, channels: usize) {
    if let Some(c) = ITEMS_RELAYED.get() {
        c.inc_by(items as u64);
    }
    if let Some(c) = LINES_SENT.get() {
        c.inc_by(channels as u64);
    }
}

#[inline]
pub fn record_confirmation(confirmed: bool) {
    if let Some(c) = CONFIRMATIONS.get() {
        let result = if confirmed { "confirmed" } else { "rejected" };
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn set_monitored_feeds(count: usize) {
    if let Some(g) = MONITORED_FEEDS.get() {
        g.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_poll("chat", "ok");
        record_relayed(2, 3);
        record_confirmation(true);

        let output = gather_metrics();
        assert!(output.contains("relay_polls_total"));
        assert!(output.contains("relay_items_total"));
        assert!(output.contains("relay_confirmations_total"));
    }
}
