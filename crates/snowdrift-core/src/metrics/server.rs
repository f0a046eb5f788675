//! Prometheus recorder and HTTP endpoint.
//!
//! The recorder is a process-wide singleton; `init_global` installs it and
//! serves `/metrics` and `/health`, `init_test` installs it without a server.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{AddressParseSnafu, AlreadyInitializedSnafu, MetricsError, PrometheusInitSnafu};

/// Histogram buckets in seconds. Warehouse statements and docker runs are
/// slow, so the range reaches well past a minute.
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
];

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Holds the Prometheus handle used to render metrics.
pub struct MetricsController {
    handle: PrometheusHandle,
}

impl MetricsController {
    /// Get the installed controller, if any.
    pub fn get() -> Option<&'static Self> {
        CONTROLLER.get()
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn install() -> Result<&'static MetricsController, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    CONTROLLER
        .set(MetricsController { handle })
        .map_err(|_| AlreadyInitializedSnafu.build())?;

    CONTROLLER.get().context(AlreadyInitializedSnafu)
}

/// Install the recorder and serve it on `address`.
///
/// Must be called from within a tokio runtime.
pub fn init_global(address: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = address.parse().context(AddressParseSnafu { address })?;
    let controller = install()?;

    tokio::spawn(run_server(addr, controller.handle.clone()));

    info!(%addr, "Metrics server started");
    Ok(())
}

/// Install the recorder without an HTTP endpoint.
///
/// Safe to call from several test threads; only the first call installs.
pub fn init_test() {
    if CONTROLLER.get().is_some() {
        return;
    }
    if install().is_err() {
        while CONTROLLER.get().is_none() {
            std::hint::spin_loop();
        }
    }
}

async fn run_server(addr: SocketAddr, handle: PrometheusHandle) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
