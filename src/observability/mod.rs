//! # Observability
//!
//! Logging and metrics for the controller.
//!
//! - `logging`: tracing subscriber setup
//! - `metrics`: Prometheus metrics collection

pub mod logging;
pub mod metrics;
