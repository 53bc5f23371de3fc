//! Prometheus metrics export.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in milliseconds for fan-out run duration.
/// Converts to seconds: [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
const RUN_DURATION_BUCKETS_MS: [u64; 7] = [10, 50, 100, 500, 1000, 5000, 30000];

/// Counters and gauges for one cursor and the runs driven over it.
///
/// All updates are relaxed atomics; a snapshot is not a consistent cut
/// across counters while a drain is still running.
#[derive(Debug, Default)]
pub struct DrainMetrics {
    // === COUNTERS ===
    /// Rows the producer read from the source, including a rejected one
    rows_observed: AtomicU64,

    /// Records appended for consumers
    records_produced: AtomicU64,

    /// Successful claims
    records_claimed: AtomicU64,

    /// Lost claim races corrected locally
    claim_retries: AtomicU64,

    /// Sleeps taken while waiting for the producer
    backoff_sleeps: AtomicU64,

    /// Drains stopped by the accept predicate
    predicate_stops: AtomicU64,

    /// Source failures
    source_errors: AtomicU64,

    /// Transform failures
    transform_errors: AtomicU64,

    /// Worker panics
    worker_panics: AtomicU64,

    /// Worker threads spawned
    workers_spawned: AtomicU64,

    /// Cursor aborts
    aborts: AtomicU64,

    // === GAUGES ===
    /// Workers currently inside a run
    active_workers: AtomicU64,

    // === HISTOGRAM: run_duration_seconds ===
    run_duration_sum_ms: AtomicU64,
    run_duration_count: AtomicU64,
    /// Buckets: [0.01s, 0.05s, 0.1s, 0.5s, 1s, 5s, 30s, +Inf]
    run_duration_buckets: [AtomicU64; 8],
}

/// Point-in-time copy of [`DrainMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_observed: u64,
    pub records_produced: u64,
    pub records_claimed: u64,
    pub claim_retries: u64,
    pub backoff_sleeps: u64,
    pub predicate_stops: u64,
    pub source_errors: u64,
    pub transform_errors: u64,
    pub worker_panics: u64,
    pub workers_spawned: u64,
    pub aborts: u64,
    pub active_workers: u64,
    pub runs: u64,
}

impl MetricsSnapshot {
    /// Records produced but not yet claimed.
    pub fn unclaimed(&self) -> u64 {
        self.records_produced.saturating_sub(self.records_claimed)
    }
}

impl DrainMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    // === COUNTER RECORDING ===

    pub fn record_row_observed(&self) {
        self.rows_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_produced(&self) {
        self.records_produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim(&self) {
        self.records_claimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim_retry(&self) {
        self.claim_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff_sleep(&self) {
        self.backoff_sleeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_predicate_stop(&self) {
        self.predicate_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transform_error(&self) {
        self.transform_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    // === GAUGE UPDATES ===

    /// A worker thread started its claim loop.
    pub fn worker_started(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker thread left its claim loop.
    pub fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a completed fan-out run.
    pub fn record_run(&self, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        self.run_duration_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.run_duration_count.fetch_add(1, Ordering::Relaxed);

        // Cumulative buckets (le = less than or equal)
        for (i, &bucket_ms) in RUN_DURATION_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= bucket_ms {
                self.run_duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.run_duration_buckets[7].fetch_add(1, Ordering::Relaxed);
    }

    // === GETTERS ===

    pub fn records_produced(&self) -> u64 {
        self.records_produced.load(Ordering::Relaxed)
    }

    pub fn records_claimed(&self) -> u64 {
        self.records_claimed.load(Ordering::Relaxed)
    }

    pub fn claim_retries(&self) -> u64 {
        self.claim_retries.load(Ordering::Relaxed)
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_observed: self.rows_observed.load(Ordering::Relaxed),
            records_produced: self.records_produced.load(Ordering::Relaxed),
            records_claimed: self.records_claimed.load(Ordering::Relaxed),
            claim_retries: self.claim_retries.load(Ordering::Relaxed),
            backoff_sleeps: self.backoff_sleeps.load(Ordering::Relaxed),
            predicate_stops: self.predicate_stops.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            transform_errors: self.transform_errors.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            runs: self.run_duration_count.load(Ordering::Relaxed),
        }
    }

    /// Export all metrics in Prometheus text format.
    ///
    /// # Example
    /// ```
    /// use parcursor_core::metrics::DrainMetrics;
    ///
    /// let metrics = DrainMetrics::new();
    /// metrics.record_claim();
    /// let text = metrics.export_prometheus_text();
    /// assert!(text.contains("parcursor_records_claimed_total 1"));
    /// ```
    pub fn export_prometheus_text(&self) -> String {
        self.export_prometheus_text_with_prefix("parcursor")
    }

    /// Export metrics in Prometheus text format with custom prefix.
    pub fn export_prometheus_text_with_prefix(&self, prefix: &str) -> String {
        let s = self.snapshot();
        let mut output = String::with_capacity(4096);

        let counters = [
            ("rows_observed_total", "Rows read from the source", s.rows_observed),
            ("records_produced_total", "Records made claimable", s.records_produced),
            ("records_claimed_total", "Records claimed by consumers", s.records_claimed),
            ("claim_retries_total", "Claim races retried", s.claim_retries),
            ("backoff_sleeps_total", "Sleeps while waiting for records", s.backoff_sleeps),
            ("predicate_stops_total", "Drains stopped by the accept predicate", s.predicate_stops),
            ("source_errors_total", "Source failures", s.source_errors),
            ("transform_errors_total", "Worker transform failures", s.transform_errors),
            ("worker_panics_total", "Worker panics", s.worker_panics),
            ("workers_spawned_total", "Worker threads spawned", s.workers_spawned),
            ("aborts_total", "Cursor aborts", s.aborts),
        ];
        for (name, help, value) in counters {
            write_metric(&mut output, prefix, name, "counter", help, value);
        }

        write_metric(
            &mut output,
            prefix,
            "active_workers",
            "gauge",
            "Workers currently claiming",
            s.active_workers,
        );
        write_metric(
            &mut output,
            prefix,
            "unclaimed_records",
            "gauge",
            "Records produced but not yet claimed",
            s.unclaimed(),
        );

        // === HISTOGRAM: run_duration_seconds ===
        let _ = writeln!(
            output,
            "# HELP {}_run_duration_seconds Duration of fan-out runs",
            prefix
        );
        let _ = writeln!(output, "# TYPE {}_run_duration_seconds histogram", prefix);
        for (i, bucket_ms) in RUN_DURATION_BUCKETS_MS.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}_run_duration_seconds_bucket{{le=\"{}\"}} {}",
                prefix,
                *bucket_ms as f64 / 1000.0,
                self.run_duration_buckets[i].load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(
            output,
            "{}_run_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            prefix,
            self.run_duration_buckets[7].load(Ordering::Relaxed)
        );
        let _ = writeln!(
            output,
            "{}_run_duration_seconds_sum {}",
            prefix,
            self.run_duration_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
        let _ = writeln!(
            output,
            "{}_run_duration_seconds_count {}",
            prefix,
            self.run_duration_count.load(Ordering::Relaxed)
        );

        output
    }
}

fn write_metric(output: &mut String, prefix: &str, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {}_{} {}", prefix, name, help);
    let _ = writeln!(output, "# TYPE {}_{} {}", prefix, name, kind);
    let _ = writeln!(output, "{}_{} {}", prefix, name, value);
    output.push('\n');
}
