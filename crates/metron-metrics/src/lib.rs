//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Prometheus export for measurement records."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
#![warn(missing_docs)]
use std::sync::Arc;

use prometheus::Registry;

/// Counters describing the export itself.
pub mod export;
/// Pushgateway client.
pub mod push;
/// `/metrics` scrape endpoint.
pub mod server;
/// Gauge-backed record sink.
pub mod sink;

pub use export::ExportMetrics;
pub use push::{PushGateway, PushMethod};
pub use server::{spawn_http_server, MetricsServer};
pub use sink::{metric_name, PrometheusSink};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Result alias for the metrics crate.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Error type for Prometheus export.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Wrapper for registration and encoding failures.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// Wrapper for transport failures talking to the Pushgateway.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The Pushgateway answered with a non-success status.
    #[error("pushgateway returned {status}: {body}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The Pushgateway URL cannot carry a job path.
    #[error("invalid pushgateway url {0}")]
    InvalidUrl(String),
}

/// Re-exported so callers build collectors against the same version.
pub use prometheus;
