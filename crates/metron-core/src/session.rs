//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Measurement session lifecycle and sink fan-out."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::context::Context;
use crate::delivery::{Delivery, DeliveryPolicy, SinkFailure};
use crate::error::{MeasureError, Phase, Result, SessionError, UsageFault};
use crate::record::Record;
use crate::sink::{SharedSink, SinkError};
use crate::source::MeasuredSource;
use crate::value::Value;

/// Which report call produces the records of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Use [`MeasuredSource::aggregate_report`].
    #[default]
    Aggregate,
    /// Use [`MeasuredSource::report`].
    Detailed,
}

impl ReportMode {
    /// Map the boolean aggregation flag onto a mode.
    pub fn from_aggregate(aggregate: bool) -> Self {
        if aggregate {
            ReportMode::Aggregate
        } else {
            ReportMode::Detailed
        }
    }

    /// Lowercase label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Aggregate => "aggregate",
            ReportMode::Detailed => "detailed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Ready,
    Entered,
    Exited,
}

/// Value returned by the measured work together with the delivery summary.
#[derive(Debug)]
pub struct Measured<T> {
    /// Whatever the measured work returned.
    pub value: T,
    /// Fan-out summary of the session exit.
    pub delivery: Delivery,
}

/// One start -> finish -> report -> deliver cycle over a borrowed source.
///
/// The session borrows its source for its whole lifetime and is single-use:
/// once exited it cannot be entered again.
///
/// ```
/// use metron_core::{record, MeasuredSource, MeasurementSession, Record, SourceResult};
///
/// struct Fixed;
///
/// impl MeasuredSource for Fixed {
///     fn kind(&self) -> &str { "Fixed" }
///     fn start(&mut self) -> SourceResult<()> { Ok(()) }
///     fn finish(&mut self) -> SourceResult<()> { Ok(()) }
///     fn report(&mut self) -> SourceResult<Vec<Record>> { Ok(vec![record! { "rows" => 3 }]) }
/// }
///
/// let mut source = Fixed;
/// let mut session = MeasurementSession::new(&mut source, Vec::new());
/// let measured = session
///     .measure(|context| {
///         context.set("job", "doc");
///         Ok::<_, std::convert::Infallible>(())
///     })
///     .unwrap();
/// assert_eq!(measured.delivery.records(), 1);
/// ```
pub struct MeasurementSession<'a> {
    source: &'a mut dyn MeasuredSource,
    sinks: Vec<SharedSink>,
    context: Context,
    mode: ReportMode,
    policy: DeliveryPolicy,
    state: SessionState,
}

impl<'a> MeasurementSession<'a> {
    /// Session in aggregate mode with best-effort delivery.
    pub fn new(source: &'a mut dyn MeasuredSource, sinks: Vec<SharedSink>) -> Self {
        Self::builder(source).sinks(sinks).build()
    }

    /// Start configuring a session around `source`.
    pub fn builder(source: &'a mut dyn MeasuredSource) -> SessionBuilder<'a> {
        SessionBuilder {
            source,
            sinks: Vec::new(),
            mode: ReportMode::default(),
            policy: DeliveryPolicy::default(),
            context: Vec::new(),
        }
    }

    /// Context merged into every record.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the context, usable before entering.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Report mode chosen at construction.
    pub fn report_mode(&self) -> ReportMode {
        self.mode
    }

    /// Delivery policy chosen at construction.
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Whether the session has completed its cycle.
    pub fn is_exited(&self) -> bool {
        self.state == SessionState::Exited
    }

    /// Start the source and open the measurement scope.
    ///
    /// The returned guard exits the session when dropped, so the source is
    /// finished on every path out of the scope. Prefer [`SessionGuard::exit`]
    /// to observe exit errors.
    pub fn enter(&mut self) -> Result<SessionGuard<'_, 'a>> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Entered => return Err(UsageFault::AlreadyEntered.into()),
            SessionState::Exited => return Err(UsageFault::AlreadyExited.into()),
        }

        debug!(
            source = self.source.kind(),
            sinks = self.sinks.len(),
            mode = self.mode.as_str(),
            "entering measurement session"
        );
        if let Err(cause) = self.source.start() {
            // Nothing was started, so there is nothing to finish.
            self.state = SessionState::Exited;
            return Err(self.source_fault(Phase::Start, cause));
        }
        self.state = SessionState::Entered;
        Ok(SessionGuard {
            session: self,
            armed: true,
        })
    }

    /// Run `body` inside the measurement scope.
    ///
    /// The source is finished and records are delivered whether `body`
    /// returns `Ok`, returns `Err` or panics.
    pub fn measure<T, E, F>(&mut self, body: F) -> std::result::Result<Measured<T>, MeasureError<E>>
    where
        F: FnOnce(&mut Context) -> std::result::Result<T, E>,
    {
        let mut guard = self.enter()?;
        let outcome = body(&mut *guard);
        match (outcome, guard.exit()) {
            (Ok(value), Ok(delivery)) => Ok(Measured { value, delivery }),
            (Err(body), Ok(_)) => Err(MeasureError::Body(body)),
            (Ok(_), Err(session)) => Err(MeasureError::Session(session)),
            (Err(body), Err(session)) => Err(MeasureError::Both { body, session }),
        }
    }

    fn exit_scope(&mut self) -> Result<Delivery> {
        self.state = SessionState::Exited;

        if let Err(cause) = self.source.finish() {
            return Err(self.source_fault(Phase::Finish, cause));
        }
        let records = match self.mode {
            ReportMode::Aggregate => self.source.aggregate_report(),
            ReportMode::Detailed => self.source.report(),
        };
        let records = match records {
            Ok(records) => records,
            Err(cause) => return Err(self.source_fault(Phase::Report, cause)),
        };

        let delivery = self.fan_out(&records);
        debug!(
            source = self.source.kind(),
            records = delivery.records(),
            delivered = delivery.delivered(),
            failed = delivery.failures().len(),
            "measurement session exited"
        );
        if self.policy == DeliveryPolicy::Strict && !delivery.is_complete() {
            return Err(SessionError::Delivery(delivery));
        }
        Ok(delivery)
    }

    fn fan_out(&self, records: &[Record]) -> Delivery {
        let mut delivery = Delivery::new(records.len(), self.sinks.len());
        for (record_index, record) in records.iter().enumerate() {
            let merged = self.context.merge(record);
            for (sink_index, sink) in self.sinks.iter().enumerate() {
                let pushed = panic::catch_unwind(AssertUnwindSafe(|| sink.push(&merged)))
                    .unwrap_or_else(|payload| Err(SinkError::Panicked(panic_message(&*payload))));
                if let Err(err) = pushed {
                    warn!(
                        sink = sink.kind(),
                        sink_index,
                        record_index,
                        error = %err,
                        "sink failed to accept measurement record"
                    );
                    delivery.record_failure(SinkFailure {
                        sink: sink.kind().to_owned(),
                        sink_index,
                        record_index,
                        error: err,
                    });
                }
            }
        }
        delivery
    }

    fn source_fault(&self, phase: Phase, cause: crate::source::SourceError) -> SessionError {
        SessionError::Source {
            kind: self.source.kind().to_owned(),
            phase,
            cause,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl fmt::Debug for MeasurementSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementSession")
            .field("source", &self.source.kind())
            .field("sinks", &self.sinks.len())
            .field("context", &self.context)
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}

/// Builder for [`MeasurementSession`].
pub struct SessionBuilder<'a> {
    source: &'a mut dyn MeasuredSource,
    sinks: Vec<SharedSink>,
    mode: ReportMode,
    policy: DeliveryPolicy,
    context: Vec<(String, Value)>,
}

impl<'a> SessionBuilder<'a> {
    /// Register a sink after the ones already registered.
    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Register several sinks, in order.
    pub fn sinks(mut self, sinks: impl IntoIterator<Item = SharedSink>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Choose the report call.
    pub fn report_mode(mut self, mode: ReportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for [`report_mode`](Self::report_mode) from a boolean flag.
    pub fn aggregate(self, aggregate: bool) -> Self {
        self.report_mode(ReportMode::from_aggregate(aggregate))
    }

    /// Choose how sink faults affect the exit result.
    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Preset a context field.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Finish configuration. Seeds the `source` and `sinks` context fields.
    pub fn build(self) -> MeasurementSession<'a> {
        let sink_kinds = self
            .sinks
            .iter()
            .map(|sink| sink.kind().to_owned())
            .collect();
        let mut context = Context::seeded(self.source.kind(), sink_kinds);
        context.extend(self.context);
        MeasurementSession {
            source: self.source,
            sinks: self.sinks,
            context,
            mode: self.mode,
            policy: self.policy,
            state: SessionState::Ready,
        }
    }
}

/// Open measurement scope. Dereferences to the session [`Context`].
///
/// Dropping the guard exits the session; errors from a drop-time exit can only
/// be logged. When the drop happens while a panic unwinds, records are still
/// delivered, and a sink panicking at that point aborts the process.
pub struct SessionGuard<'s, 'a> {
    session: &'s mut MeasurementSession<'a>,
    armed: bool,
}

impl SessionGuard<'_, '_> {
    /// Finish the source, take its report and fan records out to every sink.
    pub fn exit(mut self) -> Result<Delivery> {
        self.armed = false;
        self.session.exit_scope()
    }
}

impl fmt::Debug for SessionGuard<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("source", &self.session.source.kind())
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl Deref for SessionGuard<'_, '_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.session.context
    }
}

impl DerefMut for SessionGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.session.context
    }
}

impl Drop for SessionGuard<'_, '_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let unwinding = std::thread::panicking();
        if let Err(err) = self.session.exit_scope() {
            error!(
                source = self.session.source.kind(),
                unwinding,
                error = %err,
                "measurement session failed during scope exit"
            );
        }
    }
}
