use crate::error::ErrorCode;
use crate::models::TransactionStatus;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the account engine.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    /// A fund-engine operation committed at the given status.
    pub fn record_operation(&self, operation: &'static str, status: TransactionStatus) {
        counter!("bank_operations_total", "operation" => operation, "status" => status.as_str())
            .increment(1);
    }

    /// A fund-engine operation was refused before any write.
    pub fn record_rejection(&self, operation: &'static str, code: ErrorCode) {
        counter!("bank_operations_rejected_total", "operation" => operation, "code" => code.as_str())
            .increment(1);
    }

    pub fn record_reversal(&self) {
        counter!("bank_reversals_total").increment(1);
    }

    pub fn record_ledger_write_latency(&self, duration_ms: f64) {
        histogram!("bank_ledger_write_duration_ms").record(duration_ms);
    }

    pub fn record_balance_query_latency(&self, duration_ms: f64) {
        histogram!("bank_balance_query_duration_ms").record(duration_ms);
    }

    /// A reconciliation pass found a drifted cached balance.
    pub fn record_reconciliation_drift(&self, repaired: bool) {
        counter!("bank_reconciliation_drift_total", "repaired" => if repaired { "true" } else { "false" })
            .increment(1);
    }

    /// Outstanding invariant violations found by the last sweep.
    pub fn set_invariant_violations(&self, count: i64) {
        gauge!("bank_invariant_violations").set(count as f64);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

fn describe_metrics() {
    describe_counter!(
        "bank_operations_total",
        Unit::Count,
        "Fund-engine operations committed, by operation and status"
    );
    describe_counter!(
        "bank_operations_rejected_total",
        Unit::Count,
        "Fund-engine operations refused at admission, by operation and code"
    );
    describe_counter!("bank_reversals_total", Unit::Count, "Admin reversals committed");
    describe_histogram!(
        "bank_ledger_write_duration_ms",
        Unit::Milliseconds,
        "Ledger pair write latency in milliseconds"
    );
    describe_histogram!(
        "bank_balance_query_duration_ms",
        Unit::Milliseconds,
        "Balance derivation latency in milliseconds"
    );
    describe_counter!(
        "bank_reconciliation_drift_total",
        Unit::Count,
        "Cached balances found drifted from the ledger"
    );
    describe_gauge!(
        "bank_invariant_violations",
        Unit::Count,
        "Invariant violations found by the last verifier sweep"
    );
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
