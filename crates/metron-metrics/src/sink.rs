//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Sink writing numeric record fields as Prometheus gauges."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Instant;

use metron_core::{Record, Sink, SinkError, SinkResult};
use parking_lot::Mutex;
use prometheus::{Gauge, Opts};
use tracing::{debug, warn};

use crate::export::ExportMetrics;
use crate::push::PushGateway;
use crate::SharedRegistry;

/// Prometheus metric name for a record field: `<namespace>_<key>`, with every
/// character outside `[a-zA-Z0-9_:]` replaced by `_`.
pub fn metric_name(namespace: &str, key: &str) -> String {
    let raw = if namespace.is_empty() {
        key.to_owned()
    } else {
        format!("{namespace}_{key}")
    };
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Sets one gauge per numeric field of each record, then optionally pushes the
/// registry to a Pushgateway.
///
/// Text and list fields are skipped. Later records overwrite earlier values
/// for the same field.
pub struct PrometheusSink {
    kind: String,
    namespace: String,
    registry: SharedRegistry,
    const_labels: HashMap<String, String>,
    gauges: Mutex<HashMap<String, Gauge>>,
    gateway: Option<PushGateway>,
    metrics: Option<ExportMetrics>,
}

impl PrometheusSink {
    /// Default sink kind.
    pub const KIND: &'static str = "prometheus";

    /// Sink registering `<namespace>_<key>` gauges on `registry`.
    pub fn new(registry: SharedRegistry, namespace: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND.to_owned(),
            namespace: namespace.into(),
            registry,
            const_labels: HashMap::new(),
            gauges: Mutex::new(HashMap::new()),
            gateway: None,
            metrics: None,
        }
    }

    /// Override the reported sink kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Labels attached to every gauge this sink creates.
    pub fn with_const_labels<K, V>(mut self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.const_labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Push the registry after every record.
    pub fn with_gateway(mut self, gateway: PushGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Count exported records and pushes in `metrics`.
    pub fn with_export_metrics(mut self, metrics: ExportMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry the gauges live on.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Current value of the gauge backing `key`, if one was created.
    ///
    /// Keys that sanitise to the same metric name share one gauge.
    pub fn gauge_value(&self, key: &str) -> Option<f64> {
        let name = metric_name(&self.namespace, key);
        self.gauges.lock().get(&name).map(Gauge::get)
    }

    fn gauge_for(&self, key: &str) -> prometheus::Result<Gauge> {
        let name = metric_name(&self.namespace, key);
        let mut gauges = self.gauges.lock();
        if let Some(gauge) = gauges.get(&name) {
            return Ok(gauge.clone());
        }
        let opts = Opts::new(name.clone(), format!("Measurement field `{key}`"))
            .const_labels(self.const_labels.clone());
        let gauge = Gauge::with_opts(opts)?;
        self.registry.register(Box::new(gauge.clone()))?;
        debug!(sink = %self.kind, metric = %name, "registered gauge");
        gauges.insert(name, gauge.clone());
        Ok(gauge)
    }
}

impl Sink for PrometheusSink {
    fn kind(&self) -> &str {
        &self.kind
    }

    /// Sets every numeric field it can, pushes, then reports all field and
    /// push failures together.
    fn push(&self, record: &Record) -> SinkResult<()> {
        let mut failures = Vec::new();
        for (key, value) in record.iter() {
            let Some(number) = value.as_f64() else {
                continue;
            };
            match self.gauge_for(key) {
                Ok(gauge) => gauge.set(number),
                Err(err) => failures.push(format!("field `{key}`: {err}")),
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_record(&self.kind);
        }

        if let Some(gateway) = &self.gateway {
            let started = Instant::now();
            let outcome = gateway.push(&self.registry);
            if let Some(metrics) = &self.metrics {
                metrics.observe_push(outcome.is_ok(), started.elapsed());
            }
            if let Err(err) = outcome {
                warn!(sink = %self.kind, endpoint = %gateway.endpoint(), error = %err, "pushgateway push failed");
                failures.push(format!("push to {}: {err}", gateway.endpoint()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Backend(anyhow::anyhow!(failures.join("; "))))
        }
    }
}

impl std::fmt::Debug for PrometheusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusSink")
            .field("kind", &self.kind)
            .field("namespace", &self.namespace)
            .field("gateway", &self.gateway.as_ref().map(PushGateway::endpoint))
            .finish_non_exhaustive()
    }
}
