//! ---
//! metron_section: "15-testing-qa-runbook"
//! metron_subsection: "integration-tests"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Measurement sessions over the built-in sources and sinks."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use metron_core::{
    DeliveryPolicy, MeasureError, MeasurementSession, Record, ReportMode, SessionError,
    SharedSink, Sink, SinkError, SinkResult, SourceState, Value,
};
use metron_sinks::{JsonLinesSink, MemorySink};
use metron_sources::{LapTimer, Stopwatch};

struct Refusing;

impl Sink for Refusing {
    fn kind(&self) -> &str {
        "refusing"
    }

    fn push(&self, _record: &Record) -> SinkResult<()> {
        Err(SinkError::rejected("disk full"))
    }
}

#[test]
fn stopwatch_session_exports_to_memory_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.jsonl");
    let memory = Arc::new(MemorySink::new());
    let file: SharedSink = Arc::new(JsonLinesSink::append_to(&path).unwrap());

    let mut stopwatch = Stopwatch::new();
    let mut session = MeasurementSession::new(&mut stopwatch, vec![memory.clone(), file]);
    session.context_mut().set("job", "nightly-export");
    let measured = session
        .measure(|_| {
            thread::sleep(Duration::from_millis(10));
            Ok::<_, std::convert::Infallible>(7)
        })
        .unwrap();
    drop(session);

    assert_eq!(measured.value, 7);
    assert!(measured.delivery.is_complete());
    assert_eq!(stopwatch.state(), SourceState::Finished);

    let records = memory.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.get("source"), Some(&Value::from("Stopwatch")));
    assert_eq!(
        record.get("sinks"),
        Some(&Value::from(vec!["memory", "json-file"]))
    );
    assert_eq!(record.get("job"), Some(&Value::from("nightly-export")));
    assert!(record.get("duration").and_then(Value::as_f64).unwrap() >= 0.01);

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let json: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(json["source"], "Stopwatch");
    assert_eq!(json["job"], "nightly-export");
    assert!(json["started_at"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn lap_timer_report_mode_selects_records() {
    for (mode, expected) in [(ReportMode::Aggregate, 1), (ReportMode::Detailed, 3)] {
        let memory = Arc::new(MemorySink::new());
        let mut timer = LapTimer::new();
        let marker = timer.marker();
        let mut session = MeasurementSession::builder(&mut timer)
            .sink(memory.clone())
            .report_mode(mode)
            .build();
        session
            .measure(|_| {
                for name in ["extract", "transform", "load"] {
                    marker.lap(name)?;
                }
                Ok::<_, metron_core::LifecycleError>(())
            })
            .unwrap();

        let records = memory.records();
        assert_eq!(records.len(), expected, "mode {}", mode.as_str());
        for record in &records {
            assert_eq!(record.get("source"), Some(&Value::from("LapTimer")));
        }
        if mode == ReportMode::Detailed {
            assert_eq!(records[2].get("lap"), Some(&Value::from("load")));
        } else {
            assert_eq!(records[0].get("laps"), Some(&Value::from(3)));
        }
    }
}

#[test]
fn failing_sink_does_not_starve_later_sinks() {
    let memory = Arc::new(MemorySink::new());
    let mut stopwatch = Stopwatch::new();
    let mut session = MeasurementSession::builder(&mut stopwatch)
        .sink(Arc::new(Refusing))
        .sink(memory.clone())
        .build();

    let measured = session
        .measure(|_| Ok::<_, std::convert::Infallible>(()))
        .unwrap();
    assert_eq!(measured.delivery.failures().len(), 1);
    assert_eq!(measured.delivery.failures()[0].sink, "refusing");
    assert_eq!(memory.len(), 1);
}

#[test]
fn strict_policy_reports_refused_deliveries() {
    let memory = Arc::new(MemorySink::new());
    let mut stopwatch = Stopwatch::new();
    let mut session = MeasurementSession::builder(&mut stopwatch)
        .sink(Arc::new(Refusing))
        .sink(memory.clone())
        .delivery_policy(DeliveryPolicy::Strict)
        .build();

    let err = session
        .measure(|_| Ok::<_, std::convert::Infallible>(()))
        .unwrap_err();
    match err {
        MeasureError::Session(SessionError::Delivery(delivery)) => {
            assert_eq!(delivery.attempted(), 2);
            assert_eq!(delivery.delivered(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(memory.len(), 1);
}

#[test]
fn body_failure_still_exports_measurement() {
    let memory = Arc::new(MemorySink::new());
    let mut stopwatch = Stopwatch::new();
    let mut session = MeasurementSession::new(&mut stopwatch, vec![memory.clone()]);

    let err = session
        .measure(|_| -> Result<(), anyhow::Error> { Err(anyhow::anyhow!("upstream timeout")) })
        .unwrap_err();
    assert_eq!(err.body().map(ToString::to_string).as_deref(), Some("upstream timeout"));
    assert!(err.session().is_none());
    assert_eq!(memory.len(), 1);
}

#[test]
fn sessions_on_many_threads_share_one_sink() {
    let memory = Arc::new(MemorySink::new());
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let sink: SharedSink = memory.clone();
            thread::spawn(move || {
                let mut stopwatch = Stopwatch::with_kind(format!("worker-{worker}"));
                let mut session = MeasurementSession::new(&mut stopwatch, vec![sink]);
                session.context_mut().set("worker", worker);
                session
                    .measure(|_| Ok::<_, std::convert::Infallible>(()))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let records = memory.records();
    assert_eq!(records.len(), 8);
    let mut workers: Vec<i64> = records
        .iter()
        .map(|record| match record.get("worker") {
            Some(Value::Integer(worker)) => *worker,
            other => panic!("missing worker field: {other:?}"),
        })
        .collect();
    workers.sort_unstable();
    assert_eq!(workers, (0..8).collect::<Vec<_>>());
    for record in &records {
        let worker = record.get("worker").unwrap().to_string();
        assert_eq!(
            record.get("source"),
            Some(&Value::from(format!("worker-{worker}")))
        );
    }
}
