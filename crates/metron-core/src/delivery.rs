//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Fan-out bookkeeping for a session exit."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use crate::sink::SinkError;

/// How a session reacts to sink faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Log each fault and keep going; exit succeeds.
    #[default]
    BestEffort,
    /// Keep going, then fail the exit if any push failed.
    Strict,
}

/// One failed `push`.
#[derive(Debug)]
pub struct SinkFailure {
    /// Kind of the sink that failed.
    pub sink: String,
    /// Position of the sink in registration order.
    pub sink_index: usize,
    /// Position of the record in report order.
    pub record_index: usize,
    /// The error the sink returned.
    pub error: SinkError,
}

/// Summary of the fan-out performed by one session exit.
#[derive(Debug, Default)]
pub struct Delivery {
    records: usize,
    sinks: usize,
    failures: Vec<SinkFailure>,
}

impl Delivery {
    pub(crate) fn new(records: usize, sinks: usize) -> Self {
        Self {
            records,
            sinks,
            failures: Vec::new(),
        }
    }

    pub(crate) fn record_failure(&mut self, failure: SinkFailure) {
        self.failures.push(failure);
    }

    /// Records returned by the source.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Push attempts made, `records * sinks`.
    pub fn attempted(&self) -> usize {
        self.records * self.sinks
    }

    /// Pushes that succeeded.
    pub fn delivered(&self) -> usize {
        self.attempted() - self.failures.len()
    }

    /// Failed pushes in the order they happened.
    pub fn failures(&self) -> &[SinkFailure] {
        &self.failures
    }

    /// Whether every push succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
