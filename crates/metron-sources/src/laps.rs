//! ---
//! metron_section: "02-sources"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Lap timer source with per-lap and summary reports."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use metron_core::{Lifecycle, LifecycleError, MeasuredSource, Record, SourceResult, SourceState};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

/// One completed lap.
#[derive(Debug, Clone, PartialEq)]
pub struct Lap {
    /// Name given when the lap was closed.
    pub name: String,
    /// Time since the previous lap, or since start for the first one.
    pub duration: Duration,
}

/// Distribution of lap durations, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapSummary {
    /// Number of laps summarised.
    pub laps: u64,
    /// Mean lap duration.
    pub mean_s: f64,
    /// Sample standard deviation; zero for a single lap.
    pub std_dev_s: f64,
    /// Shortest lap.
    pub min_s: f64,
    /// Longest lap.
    pub max_s: f64,
}

impl LapSummary {
    fn from_laps(laps: &[Lap]) -> Option<Self> {
        if laps.is_empty() {
            return None;
        }
        let samples: Vec<f64> = laps.iter().map(|lap| lap.duration.as_secs_f64()).collect();
        let count = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let variance = if samples.len() > 1 {
            let sum_sq = samples
                .iter()
                .map(|value| {
                    let delta = value - mean;
                    delta * delta
                })
                .sum::<f64>();
            sum_sq / (count - 1.0)
        } else {
            0.0
        };
        Some(Self {
            laps: samples.len() as u64,
            mean_s: mean,
            std_dev_s: variance.sqrt(),
            min_s: samples.iter().copied().fold(f64::MAX, f64::min),
            max_s: samples.iter().copied().fold(f64::MIN, f64::max),
        })
    }
}

#[derive(Debug, Default)]
struct LapState {
    lifecycle: Lifecycle,
    started: Option<Instant>,
    last_mark: Option<Instant>,
    finished: Option<Instant>,
    laps: Vec<Lap>,
}

/// Stopwatch split into named laps by the measured work.
///
/// The session holds the timer mutably, so the work marks laps through a
/// [`LapMarker`] obtained before the session is built.
///
/// * `report()` yields one record per lap: `{lap, index, duration}`.
/// * `aggregate_report()` yields one summary record: `{laps, duration}` plus
///   `lap_mean`, `lap_std_dev`, `lap_min` and `lap_max` when any lap was marked.
#[derive(Debug)]
pub struct LapTimer {
    kind: String,
    state: Arc<Mutex<LapState>>,
}

impl LapTimer {
    /// Default `source` name.
    pub const KIND: &'static str = "LapTimer";

    /// Lap timer reporting [`Self::KIND`].
    pub fn new() -> Self {
        Self::with_kind(Self::KIND)
    }

    /// Lap timer reporting a custom `source` name.
    pub fn with_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            state: Arc::new(Mutex::new(LapState::default())),
        }
    }

    /// Handle for marking laps while the timer runs.
    pub fn marker(&self) -> LapMarker {
        LapMarker {
            state: self.state.clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SourceState {
        self.state.lock().lifecycle.state()
    }

    /// Laps marked so far.
    pub fn laps(&self) -> Vec<Lap> {
        self.state.lock().laps.clone()
    }

    /// Aggregate over the laps so far; `None` when no lap was marked.
    pub fn summary(&self) -> Option<LapSummary> {
        LapSummary::from_laps(&self.state.lock().laps)
    }
}

impl Default for LapTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasuredSource for LapTimer {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn start(&mut self) -> SourceResult<()> {
        let mut state = self.state.lock();
        state.lifecycle.start()?;
        let now = Instant::now();
        state.started = Some(now);
        state.last_mark = Some(now);
        Ok(())
    }

    fn finish(&mut self) -> SourceResult<()> {
        let mut state = self.state.lock();
        state.lifecycle.finish()?;
        state.finished = Some(Instant::now());
        trace!(source = %self.kind, laps = state.laps.len(), "lap timer finished");
        Ok(())
    }

    fn report(&mut self) -> SourceResult<Vec<Record>> {
        let state = self.state.lock();
        state.lifecycle.ensure_finished("report")?;
        Ok(state
            .laps
            .iter()
            .enumerate()
            .map(|(index, lap)| {
                Record::new()
                    .with("lap", lap.name.as_str())
                    .with("index", index)
                    .with("duration", lap.duration)
            })
            .collect())
    }

    fn aggregate_report(&mut self) -> SourceResult<Vec<Record>> {
        let state = self.state.lock();
        state.lifecycle.ensure_finished("aggregate report")?;
        let mut record = Record::new().with("laps", state.laps.len());
        if let (Some(started), Some(finished)) = (state.started, state.finished) {
            record.insert("duration", finished.duration_since(started));
        }
        if let Some(summary) = LapSummary::from_laps(&state.laps) {
            record.insert("lap_mean", summary.mean_s);
            record.insert("lap_std_dev", summary.std_dev_s);
            record.insert("lap_min", summary.min_s);
            record.insert("lap_max", summary.max_s);
        }
        Ok(vec![record])
    }
}

/// Cloneable handle used by measured work to close laps.
#[derive(Debug, Clone)]
pub struct LapMarker {
    state: Arc<Mutex<LapState>>,
}

impl LapMarker {
    /// Close the current lap under `name` and return its duration.
    pub fn lap(&self, name: impl Into<String>) -> Result<Duration, LifecycleError> {
        let mut state = self.state.lock();
        state.lifecycle.ensure_running("mark a lap on")?;
        let now = Instant::now();
        let duration = state
            .last_mark
            .map(|mark| now.duration_since(mark))
            .unwrap_or_default();
        state.last_mark = Some(now);
        state.laps.push(Lap {
            name: name.into(),
            duration,
        });
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metron_core::Value;

    fn run_laps(names: &[&str]) -> LapTimer {
        let mut timer = LapTimer::new();
        let marker = timer.marker();
        timer.start().unwrap();
        for name in names {
            std::thread::sleep(Duration::from_millis(2));
            marker.lap(*name).unwrap();
        }
        timer.finish().unwrap();
        timer
    }

    #[test]
    fn detailed_report_has_one_record_per_lap() {
        let mut timer = run_laps(&["extract", "transform", "load"]);
        let records = timer.report().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].get("lap"), Some(&Value::from("transform")));
        assert_eq!(records[2].get("index"), Some(&Value::Integer(2)));
        assert!(records.iter().all(|r| r.get("duration").and_then(Value::as_f64).unwrap() > 0.0));
    }

    #[test]
    fn aggregate_report_summarises_laps() {
        let mut timer = run_laps(&["a", "b"]);
        let records = timer.aggregate_report().unwrap();
        assert_eq!(records.len(), 1);
        let summary = &records[0];
        assert_eq!(summary.get("laps"), Some(&Value::Integer(2)));
        let min = summary.get("lap_min").and_then(Value::as_f64).unwrap();
        let max = summary.get("lap_max").and_then(Value::as_f64).unwrap();
        let mean = summary.get("lap_mean").and_then(Value::as_f64).unwrap();
        assert!(min <= mean && mean <= max);
        let total = summary.get("duration").and_then(Value::as_f64).unwrap();
        assert!(total >= max);
    }

    #[test]
    fn no_laps_still_reports_total_duration() {
        let mut timer = run_laps(&[]);
        assert!(timer.report().unwrap().is_empty());
        let summary = &timer.aggregate_report().unwrap()[0];
        assert_eq!(summary.get("laps"), Some(&Value::Integer(0)));
        assert!(summary.contains_key("duration"));
        assert!(!summary.contains_key("lap_mean"));
    }

    #[test]
    fn marking_requires_a_running_timer() {
        let timer = LapTimer::new();
        let marker = timer.marker();
        let err = marker.lap("too-early").unwrap_err();
        assert_eq!(err.state, SourceState::Idle);
    }

    #[test]
    fn summary_statistics_match_hand_computation() {
        let laps = [1.0, 2.0, 3.0].map(|secs| Lap {
            name: "x".into(),
            duration: Duration::from_secs_f64(secs),
        });
        let summary = LapSummary::from_laps(&laps).unwrap();
        assert_eq!(summary.laps, 3);
        assert!((summary.mean_s - 2.0).abs() < 1e-9);
        assert!((summary.std_dev_s - 1.0).abs() < 1e-9);
        assert_eq!((summary.min_s, summary.max_s), (1.0, 3.0));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["laps"], 3);
    }
}
