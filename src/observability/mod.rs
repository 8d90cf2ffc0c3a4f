//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via `tracing`
//! - OpenTelemetry metrics for transactions and write batching

pub mod metrics;
pub mod tracing;
