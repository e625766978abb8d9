//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics
//!
//! - **Relay**: messages, frames and bytes forwarded per direction
//! - **Failures**: terminal pump failures by direction and operation
//! - **Lifecycle**: current supervisor state
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::relay::{Direction, RelayOperation, SupervisorState};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "pubsub_proxy_messages_relayed_total",
        "Total messages relayed between endpoints"
    );
    describe_counter!(
        "pubsub_proxy_frames_relayed_total",
        "Total frames relayed between endpoints"
    );
    describe_counter!(
        "pubsub_proxy_bytes_relayed_total",
        "Total payload bytes relayed between endpoints"
    );
    describe_counter!(
        "pubsub_proxy_pump_failures_total",
        "Terminal pump failures by direction and operation"
    );
    describe_gauge!(
        "pubsub_proxy_state",
        "Supervisor state (0=starting, 1=running, 2=draining, 3=stopped)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one relayed message.
pub fn record_message_relayed(direction: Direction, frames: usize, bytes: usize) {
    let label = direction.as_str();
    counter!("pubsub_proxy_messages_relayed_total", "direction" => label).increment(1);
    counter!("pubsub_proxy_frames_relayed_total", "direction" => label).increment(frames as u64);
    counter!("pubsub_proxy_bytes_relayed_total", "direction" => label).increment(bytes as u64);
}

/// Record a terminal pump failure.
pub fn record_pump_failure(direction: Direction, operation: RelayOperation) {
    counter!(
        "pubsub_proxy_pump_failures_total",
        "direction" => direction.as_str(),
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Publish the supervisor state.
pub fn set_proxy_state(state: SupervisorState) {
    gauge!("pubsub_proxy_state").set(f64::from(state.code()));
}
