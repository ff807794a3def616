//! Prometheus metrics for command dispatch and topology sweeps
//!
//! This module tracks:
//! - Dispatch: commands sent to owners by outcome, retry attempts
//! - Sweeps: cancellation and schedule sweeps by outcome, entries touched,
//!   sweep duration, superseded schedule sweeps
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Container for dispatch metrics
struct DispatchMetrics {
    commands: CounterVec,
    retries: Counter,
}

/// Container for sweep metrics
struct SweepMetrics {
    sweeps: CounterVec,
    entries: CounterVec,
    duration: HistogramVec,
    superseded: Counter,
}

static DISPATCH_METRICS: OnceLock<DispatchMetrics> = OnceLock::new();

static SWEEP_METRICS: OnceLock<SweepMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers. If
/// registration fails the error is returned and recording stays a no-op.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let dispatch = DispatchMetrics {
        commands: register_counter_vec!(
            "jikimi_dispatch_total",
            "Commands dispatched to primary owners by command and outcome",
            &["command", "outcome"]
        )?,
        retries: register_counter!(
            "jikimi_dispatch_retries_total",
            "Dispatch attempts beyond the first"
        )?,
    };

    let sweep = SweepMetrics {
        sweeps: register_counter_vec!(
            "jikimi_sweep_total",
            "Topology sweeps by kind and outcome",
            &["kind", "outcome"]
        )?,
        entries: register_counter_vec!(
            "jikimi_sweep_entries_total",
            "Entries scheduled or cancelled by topology sweeps",
            &["kind"]
        )?,
        duration: register_histogram_vec!(
            "jikimi_sweep_duration_seconds",
            "Time spent in a topology sweep in seconds",
            &["kind"],
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
        )?,
        superseded: register_counter!(
            "jikimi_sweeps_superseded_total",
            "Schedule sweeps cancelled by a newer topology event"
        )?,
    };

    DISPATCH_METRICS
        .set(dispatch)
        .map_err(|_| "Dispatch metrics already initialized")?;
    SWEEP_METRICS
        .set(sweep)
        .map_err(|_| "Sweep metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    DISPATCH_METRICS.get().is_some() && SWEEP_METRICS.get().is_some()
}

/// Render every registered metric in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one dispatched command
pub fn record_dispatch(command: &str, outcome: &str) {
    if let Some(m) = DISPATCH_METRICS.get() {
        m.commands.with_label_values(&[command, outcome]).inc();
    }
}

/// Record attempts made beyond the first
pub fn record_retries(retries: u32) {
    if retries == 0 {
        return;
    }
    if let Some(m) = DISPATCH_METRICS.get() {
        m.retries.inc_by(f64::from(retries));
    }
}

/// Record a finished sweep
pub fn record_sweep(kind: &str, outcome: &str, entries: usize) {
    let Some(m) = SWEEP_METRICS.get() else {
        return;
    };

    m.sweeps.with_label_values(&[kind, outcome]).inc();
    if entries > 0 {
        m.entries
            .with_label_values(&[kind])
            .inc_by(entries as f64);
    }
}

/// Record a schedule sweep displaced by a newer one
pub fn record_superseded() {
    if let Some(m) = SWEEP_METRICS.get() {
        m.superseded.inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct SweepTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl SweepTimer {
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for SweepTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing a sweep of `kind`
pub fn start_sweep_timer(kind: &str) -> SweepTimer {
    match SWEEP_METRICS.get() {
        Some(m) => SweepTimer {
            timer: Some(m.duration.with_label_values(&[kind]).start_timer()),
        },
        None => SweepTimer::noop(),
    }
}
