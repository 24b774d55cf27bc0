//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Sink capability receiving merged measurement records."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::sync::Arc;

use thiserror::Error;

use crate::record::Record;

/// Result alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Failure raised while delivering a record.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Wrapper for IO errors raised by writers.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The sink refused the record.
    #[error("record rejected: {0}")]
    Rejected(String),
    /// The sink panicked while accepting the record.
    #[error("sink panicked: {0}")]
    Panicked(String),
    /// Backend-specific failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl SinkError {
    /// Construct a [`SinkError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        SinkError::Rejected(reason.into())
    }

    /// Wrap an arbitrary backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SinkError::Backend(anyhow::Error::new(err))
    }
}

/// A delivery target for merged measurement records.
///
/// Sinks are shared between sessions, so `push` takes `&self`; implementations
/// that keep state are expected to guard it themselves.
pub trait Sink: Send + Sync {
    /// Descriptive name, published in the `sinks` context field.
    fn kind(&self) -> &str;

    /// Deliver one record. Errors are logged by the session, never retried.
    ///
    /// A panic is caught and reported as [`SinkError::Panicked`], except while
    /// the session exits during an unwinding panic, where it aborts.
    fn push(&self, record: &Record) -> SinkResult<()>;
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn Sink>;
