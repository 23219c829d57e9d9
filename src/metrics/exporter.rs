//! Prometheus metrics exporter
//!
//! The results server renders metrics through [`metrics_route`]; the sweep
//! binary can instead expose them on a listener of their own while it runs.

use crate::metrics::recorder::{init_metrics, RUN_DURATION_SECONDS};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Global prometheus handle
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Runs range from a few seconds of ping to many minutes of retried iperf
const RUN_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];

/// Errors that can occur during metrics setup
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),
}

fn setup_failed(e: impl std::fmt::Display) -> MetricsError {
    MetricsError::SetupFailed(e.to_string())
}

/// Install the Prometheus recorder as the global metrics recorder
///
/// With `listen_addr` the exporter also serves scrapes on that address from a
/// spawned task, so it must be called inside a tokio runtime. Later calls
/// return the handle installed by the first one.
pub fn install_recorder(
    listen_addr: Option<SocketAddr>,
) -> Result<&'static PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(RUN_DURATION_SECONDS.to_string()),
            RUN_DURATION_BUCKETS,
        )
        .map_err(setup_failed)?;

    let handle = match listen_addr {
        Some(addr) => {
            let (recorder, exporter) = builder
                .with_http_listener(addr)
                .build()
                .map_err(setup_failed)?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder).map_err(setup_failed)?;
            tokio::spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!("metrics listener on {addr} stopped: {e:?}");
                }
            });
            tracing::info!(%addr, "serving metrics");
            handle
        }
        None => builder.install_recorder().map_err(setup_failed)?,
    };

    let _ = PROMETHEUS_HANDLE.set(handle);
    // Descriptions only reach a recorder that is already installed
    init_metrics();

    PROMETHEUS_HANDLE
        .get()
        .ok_or_else(|| setup_failed("handle not stored"))
}

/// Render metrics as a string (for custom endpoints)
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

async fn serve_metrics() -> Response {
    match render_metrics() {
        Some(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response(),
    }
}

/// Create an axum route for serving metrics
pub fn metrics_route<S>() -> axum::routing::MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    axum::routing::get(serve_metrics)
}
