//! ---
//! metron_section: "05-driver"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Sink wiring and the sample lap workload."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;

use anyhow::{Context as _, Result};
use metron_common::{HarnessConfig, PushMode};
use metron_core::{Delivery, MeasurementSession, SharedSink};
use metron_metrics::{ExportMetrics, PrometheusSink, PushGateway, PushMethod, SharedRegistry};
use metron_sinks::{JsonLinesSink, TracingSink};
use metron_sources::LapTimer;
use tracing::{debug, info};

/// Context field naming the configured job.
pub const JOB_FIELD: &str = "job";

/// Build the sinks enabled in `config`, in a fixed order: console, json file,
/// log, prometheus.
pub fn build_sinks(
    config: &HarnessConfig,
    registry: &SharedRegistry,
    export: Option<ExportMetrics>,
) -> Result<Vec<SharedSink>> {
    let mut sinks: Vec<SharedSink> = Vec::new();

    if config.console.enabled {
        sinks.push(Arc::new(
            JsonLinesSink::stdout().pretty(config.console.pretty),
        ));
    }

    if config.json_file.enabled {
        let path = config
            .json_file
            .path
            .as_ref()
            .context("json_file sink is enabled but has no path")?;
        let sink = JsonLinesSink::append_to(path)
            .with_context(|| format!("unable to open {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }

    if config.log_sink.enabled {
        sinks.push(Arc::new(TracingSink::with_level(config.log_sink.level()?)));
    }

    if config.prometheus.enabled {
        let settings = &config.prometheus;
        let mut sink = PrometheusSink::new(registry.clone(), settings.namespace.clone())
            .with_const_labels(settings.const_labels.clone());
        if let Some(url) = &settings.pushgateway {
            let grouping = settings
                .grouping
                .iter()
                .map(|(label, value)| (label.as_str(), value.as_str()));
            let method = match settings.push_mode {
                PushMode::Replace => PushMethod::Replace,
                PushMode::Add => PushMethod::Add,
            };
            let gateway = PushGateway::new(url, &config.job.name, grouping, settings.push_timeout)?
                .with_method(method);
            info!(endpoint = %gateway.endpoint(), "pushgateway export enabled");
            sink = sink.with_gateway(gateway);
        }
        if let Some(export) = export {
            sink = sink.with_export_metrics(export);
        }
        sinks.push(Arc::new(sink));
    }

    debug!(sinks = sinks.len(), "sinks built");
    Ok(sinks)
}

/// Sleep through `config.job.work`, split evenly into `config.job.laps` laps,
/// inside a measurement session over a [`LapTimer`].
///
/// Blocks the calling thread.
pub fn run_sample_job(config: &HarnessConfig, sinks: Vec<SharedSink>) -> Result<Delivery> {
    let laps = config.job.laps.max(1);
    let per_lap = config.job.work / laps;

    let mut timer = LapTimer::new();
    let marker = timer.marker();

    let mut builder = MeasurementSession::builder(&mut timer)
        .sinks(sinks)
        .report_mode(config.job.report_mode())
        .delivery_policy(config.job.delivery_policy())
        .context(JOB_FIELD, config.job.name.clone());
    for (key, value) in config.context_fields() {
        builder = builder.context(key, value);
    }
    let mut session = builder.build();

    info!(
        job = %config.job.name,
        laps,
        work_secs = config.job.work.as_secs_f64(),
        mode = session.report_mode().as_str(),
        sinks = session.sink_count(),
        "running sample job"
    );

    let measured = session.measure(|context| {
        for index in 0..laps {
            thread::sleep(per_lap);
            marker.lap(format!("lap-{index}"))?;
        }
        context.set("laps_planned", laps);
        Ok::<_, metron_core::LifecycleError>(())
    })?;

    let delivery = measured.delivery;
    info!(
        job = %config.job.name,
        records = delivery.records(),
        delivered = delivery.delivered(),
        failed = delivery.failures().len(),
        "sample job finished"
    );
    Ok(delivery)
}
