//! Drain metrics with Prometheus text exposition.

mod prometheus;

pub use prometheus::{DrainMetrics, MetricsSnapshot};
