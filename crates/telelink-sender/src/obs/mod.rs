//! Lightweight in-process metrics.
//!
//! Delivery counters, closure counters, in-flight gauge, and a settlement
//! latency histogram, stored as atomics and rendered in Prometheus text format
//! by `LinkMetrics::render`.

pub mod metrics;

pub use metrics::LinkMetrics;
