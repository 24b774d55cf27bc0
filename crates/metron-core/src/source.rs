//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Measured source capability and lifecycle tracking."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fmt;

use thiserror::Error;

use crate::record::Record;

/// Result alias for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failure raised by a measured source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source was driven through an invalid state transition.
    #[error("lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleError),
    /// Backend-specific failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Lifecycle state of a measured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    /// Constructed, not yet started.
    #[default]
    Idle,
    /// Started and measuring.
    Running,
    /// Finished; reports may be taken.
    Finished,
}

impl SourceState {
    /// Lowercase label used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::Idle => "idle",
            SourceState::Running => "running",
            SourceState::Finished => "finished",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation attempted in a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a source that is {state}")]
pub struct LifecycleError {
    /// Attempted operation.
    pub action: &'static str,
    /// State the source was in.
    pub state: SourceState,
}

/// `Idle -> Running -> Finished` tracker for source implementations.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: SourceState,
}

impl Lifecycle {
    /// Create a tracker in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Transition `Idle -> Running`.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.transition("start", SourceState::Idle, SourceState::Running)
    }

    /// Transition `Running -> Finished`.
    pub fn finish(&mut self) -> Result<(), LifecycleError> {
        self.transition("finish", SourceState::Running, SourceState::Finished)
    }

    /// Fail unless the source has finished.
    pub fn ensure_finished(&self, action: &'static str) -> Result<(), LifecycleError> {
        self.ensure(action, SourceState::Finished)
    }

    /// Fail unless the source is running.
    pub fn ensure_running(&self, action: &'static str) -> Result<(), LifecycleError> {
        self.ensure(action, SourceState::Running)
    }

    fn ensure(&self, action: &'static str, expected: SourceState) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleError {
                action,
                state: self.state,
            })
        }
    }

    fn transition(
        &mut self,
        action: &'static str,
        from: SourceState,
        to: SourceState,
    ) -> Result<(), LifecycleError> {
        self.ensure(action, from)?;
        self.state = to;
        Ok(())
    }
}

/// Anything that can be measured: started, finished, then asked for records.
///
/// Implementations are driven by a [`MeasurementSession`](crate::MeasurementSession),
/// which calls `start` once, `finish` once, and then exactly one of
/// [`report`](MeasuredSource::report) or
/// [`aggregate_report`](MeasuredSource::aggregate_report).
pub trait MeasuredSource {
    /// Descriptive name, published as the `source` context field.
    fn kind(&self) -> &str;

    /// Begin measuring. Calling twice is a lifecycle error.
    fn start(&mut self) -> SourceResult<()>;

    /// Stop measuring. Called even when the measured work failed.
    fn finish(&mut self) -> SourceResult<()>;

    /// Detailed records. Only valid once finished.
    fn report(&mut self) -> SourceResult<Vec<Record>>;

    /// Summarised records. Only valid once finished.
    ///
    /// Sources without a distinct summary return their detailed report.
    fn aggregate_report(&mut self) -> SourceResult<Vec<Record>> {
        self.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_idle_running_finished() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), SourceState::Idle);
        lifecycle.start().unwrap();
        lifecycle.ensure_running("lap").unwrap();
        lifecycle.finish().unwrap();
        lifecycle.ensure_finished("report").unwrap();
    }

    #[test]
    fn second_start_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start().unwrap();
        let err = lifecycle.start().unwrap_err();
        assert_eq!(err.state, SourceState::Running);
        assert_eq!(err.to_string(), "cannot start a source that is running");
    }

    #[test]
    fn report_before_finish_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start().unwrap();
        let err = lifecycle.ensure_finished("report").unwrap_err();
        assert_eq!(err.action, "report");
        let wrapped = SourceError::from(err);
        assert!(matches!(wrapped, SourceError::Lifecycle(_)));
    }

    #[test]
    fn finish_requires_start() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.finish().is_err());
        assert_eq!(lifecycle.state(), SourceState::Idle);
    }
}
