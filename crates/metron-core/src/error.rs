//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Session error taxonomy."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fmt;

use thiserror::Error;

use crate::delivery::Delivery;
use crate::source::SourceError;

/// Result alias used by session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Source lifecycle call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `start()`
    Start,
    /// `finish()`
    Finish,
    /// `report()` or `aggregate_report()`
    Report,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "start",
            Phase::Finish => "finish",
            Phase::Report => "report",
        })
    }
}

/// Programmer misuse of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageFault {
    /// `enter()` called while the session is already entered.
    #[error("session already entered")]
    AlreadyEntered,
    /// `enter()` called on a session that has exited; sessions are single-use.
    #[error("session already exited")]
    AlreadyExited,
}

/// Error type for the measurement session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was driven incorrectly.
    #[error("usage fault: {0}")]
    Usage(#[from] UsageFault),
    /// The measured source failed during a lifecycle call.
    #[error("source `{kind}` failed during {phase}: {cause}")]
    Source {
        /// Kind of the failing source.
        kind: String,
        /// Lifecycle call that failed.
        phase: Phase,
        /// Underlying source error.
        #[source]
        cause: SourceError,
    },
    /// One or more sinks failed under [`DeliveryPolicy::Strict`](crate::DeliveryPolicy::Strict).
    #[error("{} of {} sink deliveries failed", .0.failures().len(), .0.attempted())]
    Delivery(Delivery),
}

impl SessionError {
    /// Lifecycle phase for source faults.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SessionError::Source { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Outcome of [`MeasurementSession::measure`](crate::MeasurementSession::measure)
/// when either the measured work or the session failed.
#[derive(Debug)]
pub enum MeasureError<E> {
    /// The measured work failed; the session completed.
    Body(E),
    /// The session failed; the measured work succeeded.
    Session(SessionError),
    /// Both failed.
    Both {
        /// Error returned by the measured work.
        body: E,
        /// Error raised while exiting the session.
        session: SessionError,
    },
}

impl<E> MeasureError<E> {
    /// Error returned by the measured work, if it failed.
    pub fn body(&self) -> Option<&E> {
        match self {
            MeasureError::Body(body) | MeasureError::Both { body, .. } => Some(body),
            MeasureError::Session(_) => None,
        }
    }

    /// Error raised by the session, if it failed.
    pub fn session(&self) -> Option<&SessionError> {
        match self {
            MeasureError::Session(session) | MeasureError::Both { session, .. } => Some(session),
            MeasureError::Body(_) => None,
        }
    }
}

impl<E> From<SessionError> for MeasureError<E> {
    fn from(err: SessionError) -> Self {
        MeasureError::Session(err)
    }
}

impl<E: fmt::Display> fmt::Display for MeasureError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureError::Body(body) => write!(f, "measured work failed: {body}"),
            MeasureError::Session(session) => write!(f, "{session}"),
            MeasureError::Both { body, session } => {
                write!(f, "measured work failed: {body}; session also failed: {session}")
            }
        }
    }
}

impl<E> std::error::Error for MeasureError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeasureError::Body(body) | MeasureError::Both { body, .. } => Some(body),
            MeasureError::Session(session) => Some(session),
        }
    }
}
