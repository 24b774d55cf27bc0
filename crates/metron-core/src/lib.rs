//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Measurement lifecycle controller and shared record types."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
//! Measurement lifecycle core for the Metron workspace.
//!
//! A [`MeasurementSession`] starts a [`MeasuredSource`], runs the caller's
//! work, finishes the source on every exit path, then merges each reported
//! [`Record`] with the session [`Context`] and pushes it to every [`Sink`].
#![warn(missing_docs)]

pub mod context;
pub mod delivery;
pub mod error;
pub mod record;
pub mod session;
pub mod sink;
pub mod source;
pub mod value;

pub use context::{Context, SINKS_FIELD, SOURCE_FIELD};
pub use delivery::{Delivery, DeliveryPolicy, SinkFailure};
pub use error::{MeasureError, Phase, Result, SessionError, UsageFault};
pub use record::Record;
pub use session::{Measured, MeasurementSession, ReportMode, SessionBuilder, SessionGuard};
pub use sink::{SharedSink, Sink, SinkError, SinkResult};
pub use source::{
    Lifecycle, LifecycleError, MeasuredSource, SourceError, SourceResult, SourceState,
};
pub use value::Value;
