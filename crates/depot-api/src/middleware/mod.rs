//! # HTTP Middleware
//!
//! - `metrics`: per-request counters and latency histograms.

pub mod metrics;
