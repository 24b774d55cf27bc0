//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Self-observability for the Prometheus export path."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::time::Duration;

use prometheus::{self, Histogram, HistogramOpts, IntCounterVec, Opts};

use crate::{Result, SharedRegistry};

/// Counters describing the export path itself.
#[derive(Clone)]
pub struct ExportMetrics {
    registry: SharedRegistry,
    records_total: IntCounterVec,
    pushes_total: IntCounterVec,
    push_seconds: Histogram,
}

impl ExportMetrics {
    /// Register the export metric families on `registry`.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let records_total = IntCounterVec::new(
            Opts::new(
                "metron_records_exported_total",
                "Measurement records written to the Prometheus registry",
            ),
            &["sink"],
        )?;
        registry.register(Box::new(records_total.clone()))?;

        let pushes_total = IntCounterVec::new(
            Opts::new(
                "metron_pushgateway_pushes_total",
                "Pushgateway push attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(pushes_total.clone()))?;

        let push_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "metron_pushgateway_push_seconds",
                "Time spent pushing the registry to the Pushgateway",
            )
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 14)?),
        )?;
        registry.register(Box::new(push_seconds.clone()))?;

        Ok(Self {
            registry,
            records_total,
            pushes_total,
            push_seconds,
        })
    }

    /// Registry the families were registered on.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Count one record written by `sink`.
    pub fn inc_record(&self, sink: &str) {
        self.records_total.with_label_values(&[sink]).inc();
    }

    /// Record the outcome and latency of one Pushgateway push.
    pub fn observe_push(&self, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.pushes_total.with_label_values(&[outcome]).inc();
        self.push_seconds.observe(elapsed.as_secs_f64());
    }

    /// Records counted for `sink` so far.
    pub fn records_exported(&self, sink: &str) -> u64 {
        self.records_total.with_label_values(&[sink]).get()
    }

    /// Pushes counted with the given outcome so far.
    pub fn pushes(&self, success: bool) -> u64 {
        let outcome = if success { "success" } else { "failure" };
        self.pushes_total.with_label_values(&[outcome]).get()
    }
}

impl std::fmt::Debug for ExportMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportMetrics").finish_non_exhaustive()
    }
}
