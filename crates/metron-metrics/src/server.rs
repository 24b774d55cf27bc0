//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "HTTP scrape endpoint for the shared registry."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::TextEncoder;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::SharedRegistry;

/// Routes served by [`spawn_http_server`].
pub fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .route("/healthz", get(|| async { "OK" }))
        .with_state(registry)
}

/// Serve [`router`] on `addr` until [`MetricsServer::shutdown`].
///
/// Binds synchronously so bind errors surface here; port 0 picks a free port.
/// Must be called from within a tokio runtime.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let listener = StdTcpListener::bind(addr)
        .and_then(|listener| listener.set_nonblocking(true).map(|()| listener))
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    let bound = listener.local_addr()?;
    let listener = TcpListener::from_std(listener)?;
    info!(address = %bound, "metrics server listening");

    let (shutdown, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, router(registry))
            .with_graceful_shutdown(async move {
                let _ = stopped.await;
            })
            .await
            .context("metrics server terminated")
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown),
        task,
    })
}

async fn scrape(State(registry): State<SharedRegistry>) -> Response {
    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Address the server actually bound, useful when binding port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.context("metrics server task panicked")?
    }
}
