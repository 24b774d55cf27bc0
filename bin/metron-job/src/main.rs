//! ---
//! metron_section: "05-driver"
//! metron_subsection: "binary"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Binary entrypoint for the sample measurement job."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use metron_common::config::{Delivery, HarnessConfig};
use metron_common::logging::init_tracing;
use metron_metrics::{new_registry, spawn_http_server, ExportMetrics};
use tracing::{error, info, warn};
use url::Url;

mod job;

const DEFAULT_CANDIDATES: [&str; 2] = ["metron.toml", "configs/metron.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a sample workload inside a measurement session",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the job name")]
    job: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Override the workload duration")]
    work_secs: Option<f64>,

    #[arg(long, help = "Number of laps the workload is split into")]
    laps: Option<u32>,

    #[arg(long, help = "Export one record per lap instead of a summary")]
    detailed: bool,

    #[arg(long, help = "Fail the job when any sink rejects a record")]
    strict: bool,

    #[arg(long, value_name = "ADDR", help = "Serve /metrics on this address while running")]
    serve: Option<SocketAddr>,

    #[arg(long, value_name = "URL", env = "METRON_PUSHGATEWAY", help = "Push results to this Pushgateway")]
    pushgateway: Option<Url>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    apply_overrides(&mut config, &cli)?;
    init_tracing("metron-job", &config.logging)?;

    let registry = new_registry();
    let export = if config.prometheus.enabled {
        Some(ExportMetrics::new(registry.clone())?)
    } else {
        None
    };

    let server = match config.prometheus.listen {
        Some(addr) => Some(spawn_http_server(registry.clone(), addr)?),
        None => None,
    };

    // The Pushgateway client is blocking, so sinks live on the job thread.
    let job_name = config.job.name.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let sinks = job::build_sinks(&config, &registry, export)?;
        job::run_sample_job(&config, sinks)
    })
    .await
    .context("sample job thread panicked")?;

    if let Some(server) = server {
        if let Err(err) = server.shutdown().await {
            warn!(error = %err, "metrics server shutdown failed");
        }
    }

    match outcome {
        Ok(delivery) => {
            info!(job = %job_name, complete = delivery.is_complete(), "done");
            Ok(())
        }
        Err(err) => {
            error!(job = %job_name, error = %err, "sample job failed");
            Err(err)
        }
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<HarnessConfig> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.extend(DEFAULT_CANDIDATES.iter().map(PathBuf::from));

    let env_override = std::env::var_os(HarnessConfig::ENV_CONFIG_PATH).is_some();
    if explicit.is_none() && !env_override && !candidates.iter().any(|path| path.exists()) {
        return Ok(HarnessConfig::default());
    }
    Ok(HarnessConfig::load_with_source(&candidates)?.config)
}

fn apply_overrides(config: &mut HarnessConfig, cli: &Cli) -> Result<()> {
    if let Some(name) = &cli.job {
        config.job.name = name.clone();
    }
    if let Some(secs) = cli.work_secs {
        config.job.work = std::time::Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --work-secs {secs}"))?;
    }
    if let Some(laps) = cli.laps {
        config.job.laps = laps;
    }
    if cli.detailed {
        config.job.aggregate = false;
    }
    if cli.strict {
        config.job.delivery = Delivery::Strict;
    }
    if let Some(addr) = cli.serve {
        config.prometheus.enabled = true;
        config.prometheus.listen = Some(addr);
    }
    if let Some(url) = &cli.pushgateway {
        config.prometheus.enabled = true;
        config.prometheus.pushgateway = Some(url.clone());
    }
    config.validate()
}
