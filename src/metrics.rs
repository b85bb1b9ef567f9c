//! Production observability metrics for the change feed engine
//!
//! Uses the `metrics` crate for low-overhead collection with a Prometheus
//! scrape endpoint. Emission degrades gracefully: when no recorder is
//! installed the helper calls are no-ops, so library users who do not care
//! about metrics pay nothing.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize the metrics system with a Prometheus exporter.
///
/// Call once at application startup; the function is idempotent and will not
/// reinitialize if already called.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "changes_produced_total",
        Unit::Count,
        "Total changes accepted from the repository monitor"
    );

    describe_counter!(
        "changes_delivered_total",
        Unit::Count,
        "Total changes handed to the traversal consumer"
    );

    describe_counter!(
        "checkpoints_recorded_total",
        Unit::Count,
        "Total delivery checkpoints durably recorded"
    );

    describe_counter!(
        "batches_completed_total",
        Unit::Count,
        "Total traversal batches, labeled by delay policy"
    );

    describe_counter!(
        "batch_documents_total",
        Unit::Count,
        "Total documents pushed by traversal batches"
    );

    describe_gauge!(
        "change_queue_depth",
        Unit::Count,
        "Changes currently buffered in the in-memory queue"
    );

    *initialized = true;
    info!("Metrics system initialized");
    Ok(())
}

/// A change was accepted from the producer callback.
pub fn record_change_produced() {
    counter!("changes_produced_total").increment(1);
}

/// A change was handed to the consumer.
pub fn record_change_delivered() {
    counter!("changes_delivered_total").increment(1);
}

/// A delivery checkpoint was durably recorded.
pub fn record_checkpoint_recorded() {
    counter!("checkpoints_recorded_total").increment(1);
}

/// A traversal batch finished under the given delay policy.
pub fn record_batch(policy: &'static str, documents: u32) {
    counter!("batches_completed_total", "policy" => policy).increment(1);
    counter!("batch_documents_total").increment(u64::from(documents));
}

/// Current in-memory queue depth.
pub fn set_queue_depth(depth: usize) {
    gauge!("change_queue_depth").set(depth as f64);
}
