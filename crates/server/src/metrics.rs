//! Prometheus metrics

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Idempotent; failure to install is
/// fatal at startup.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("prometheus recorder installs once at startup")
        })
        .clone()
}

/// `GET /metrics`
pub async fn metrics_handler() -> String {
    match PROMETHEUS.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}
