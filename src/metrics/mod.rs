//! Prometheus metrics for the declarative reconciler
//!
//! This module exposes metrics for monitoring reconciliation health and
//! apply outcomes.

mod prometheus;

pub use prometheus::*;
