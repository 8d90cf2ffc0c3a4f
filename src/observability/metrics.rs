//! OpenTelemetry metrics implementation.
//!
//! Key metrics:
//! - keyval_transactions_total: Counter of physical transactions by outcome
//! - keyval_transaction_latency_seconds: Histogram of transaction latency
//! - keyval_batches_total: Counter of write batches drained
//! - keyval_batched_writes_total: Counter of `set` calls written by batches

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

use crate::storage::txn::TxnMode;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Keyval metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Physical transactions, tagged by store, mode and outcome.
    pub transactions_total: Counter<u64>,
    /// Histogram of transaction latency in seconds.
    pub transaction_latency: Histogram<f64>,
    /// Number of drained write batches.
    pub batches_total: Counter<u64>,
    /// Number of individual writes carried by drained batches.
    pub batched_writes_total: Counter<u64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            transactions_total: meter
                .u64_counter("keyval_transactions_total")
                .with_description("Physical transactions run against the engine")
                .with_unit("1")
                .init(),
            transaction_latency: meter
                .f64_histogram("keyval_transaction_latency_seconds")
                .with_description("Time from transaction begin to commit or rollback")
                .with_unit("s")
                .init(),
            batches_total: meter
                .u64_counter("keyval_batches_total")
                .with_description("Write batches drained into one transaction")
                .with_unit("1")
                .init(),
            batched_writes_total: meter
                .u64_counter("keyval_batched_writes_total")
                .with_description("Writes carried by drained batches")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize metrics with a private SDK meter provider.
///
/// Installs a provider backed by a manual reader as the global provider.
/// Use this when the host does not export metrics itself; hosts that do
/// should call [`init_metrics_with_global`] instead. Calls after the first
/// initialization (by either function) are ignored.
pub fn init_metrics() {
    METRICS.get_or_init(|| {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        global::set_meter_provider(provider);

        Metrics::new(&global::meter("keyval"))
    });
}

/// Initialize metrics against the host's global meter provider.
///
/// Leaves the global provider untouched, so the host must install its own
/// (with its exporter) before calling this. Calls after the first
/// initialization (by either function) are ignored.
pub fn init_metrics_with_global() {
    METRICS.get_or_init(|| Metrics::new(&global::meter("keyval")));
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Record one physical transaction.
pub fn record_transaction(store: &str, mode: TxnMode, committed: bool, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("store", store.to_string()),
            KeyValue::new("mode", mode.as_str()),
            KeyValue::new("outcome", if committed { "commit" } else { "abort" }),
        ];
        m.transactions_total.add(1, &attrs);
        m.transaction_latency.record(latency_seconds, &attrs[..2]);
    }
}

/// Record one drained write batch of `size` items.
pub fn record_batch(store: &str, size: usize) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("store", store.to_string())];
        m.batches_total.add(1, &attrs);
        m.batched_writes_total.add(size as u64, &attrs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(metrics().is_some());
    }

    #[test]
    fn test_record_transaction() {
        init_metrics();
        // Should not panic
        record_transaction("dbName:a;;storeName:b", TxnMode::ReadWrite, true, 0.002);
        record_transaction("dbName:a;;storeName:b", TxnMode::ReadOnly, false, 0.001);
    }

    #[test]
    fn test_record_batch() {
        init_metrics();
        // Should not panic
        record_batch("dbName:a;;storeName:b", 12);
    }
}
