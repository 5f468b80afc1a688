//! Prometheus metrics endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Safe to call once; a second
/// install attempt is logged and ignored.
pub fn init_metrics() {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to install metrics recorder");
        }
    }
}

pub async fn metrics_handler() -> String {
    HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}
