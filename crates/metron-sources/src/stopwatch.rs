//! ---
//! metron_section: "02-sources"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Wall-clock stopwatch source."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metron_core::{Lifecycle, MeasuredSource, Record, SourceResult, SourceState};
use tracing::trace;

/// Measures the wall-clock time between `start` and `finish`.
///
/// Both report calls yield a single record:
/// `{duration, started_at, finished_at}`.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    kind: String,
    lifecycle: Lifecycle,
    started: Option<(Instant, DateTime<Utc>)>,
    finished: Option<(Instant, DateTime<Utc>)>,
}

impl Stopwatch {
    /// Default `source` name.
    pub const KIND: &'static str = "Stopwatch";

    /// Stopwatch reporting [`Self::KIND`].
    pub fn new() -> Self {
        Self::with_kind(Self::KIND)
    }

    /// Stopwatch reporting a custom `source` name.
    pub fn with_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            lifecycle: Lifecycle::new(),
            started: None,
            finished: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SourceState {
        self.lifecycle.state()
    }

    /// Elapsed time; `None` until finished.
    pub fn elapsed(&self) -> Option<Duration> {
        let (start, _) = self.started?;
        let (end, _) = self.finished?;
        Some(end.duration_since(start))
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasuredSource for Stopwatch {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn start(&mut self) -> SourceResult<()> {
        self.lifecycle.start()?;
        self.started = Some((Instant::now(), Utc::now()));
        trace!(source = %self.kind, "stopwatch started");
        Ok(())
    }

    fn finish(&mut self) -> SourceResult<()> {
        self.lifecycle.finish()?;
        self.finished = Some((Instant::now(), Utc::now()));
        trace!(source = %self.kind, "stopwatch finished");
        Ok(())
    }

    fn report(&mut self) -> SourceResult<Vec<Record>> {
        self.lifecycle.ensure_finished("report")?;
        let mut record = Record::new();
        if let (Some(elapsed), Some((_, started_at)), Some((_, finished_at))) =
            (self.elapsed(), self.started, self.finished)
        {
            record.insert("duration", elapsed);
            record.insert("started_at", started_at);
            record.insert("finished_at", finished_at);
        }
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metron_core::SourceError;

    #[test]
    fn reports_elapsed_time_once_finished() {
        let mut stopwatch = Stopwatch::new();
        stopwatch.start().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        stopwatch.finish().unwrap();

        let records = stopwatch.aggregate_report().unwrap();
        assert_eq!(records.len(), 1);
        let duration = records[0].get("duration").and_then(|v| v.as_f64()).unwrap();
        assert!(duration >= 0.010, "duration {duration} shorter than the sleep");
        assert!(records[0].contains_key("started_at"));
        assert!(records[0].contains_key("finished_at"));
    }

    #[test]
    fn report_before_finish_is_a_lifecycle_error() {
        let mut stopwatch = Stopwatch::with_kind("nightly-export");
        stopwatch.start().unwrap();
        let err = stopwatch.report().unwrap_err();
        assert!(matches!(err, SourceError::Lifecycle(_)));
        assert_eq!(stopwatch.kind(), "nightly-export");
    }

    #[test]
    fn second_start_is_rejected() {
        let mut stopwatch = Stopwatch::new();
        stopwatch.start().unwrap();
        assert!(stopwatch.start().is_err());
        assert_eq!(stopwatch.state(), SourceState::Running);
    }
}
