//! ---
//! metron_section: "04-configuration-logging"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "TOML configuration for measurement jobs and their sinks."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use metron_core::{DeliveryPolicy, ReportMode, Value};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds, DurationSecondsWithFrac};
use tracing::{debug, Level};
use url::Url;

use crate::logging::LogFormat;

fn default_job_name() -> String {
    "metron".to_owned()
}

fn default_aggregate() -> bool {
    true
}

fn default_work_duration() -> Duration {
    Duration::from_secs(1)
}

fn default_laps() -> u32 {
    4
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_enabled() -> bool {
    true
}

fn default_log_sink_level() -> String {
    "info".to_owned()
}

fn default_namespace() -> String {
    "metron".to_owned()
}

fn default_push_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Primary configuration object for a measurement job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub job: JobConfig,
    /// Static fields merged into every exported record.
    #[serde(default)]
    pub context: IndexMap<String, toml::Value>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub json_file: JsonFileConfig,
    #[serde(default)]
    pub log_sink: LogSinkConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Metadata describing where a [`HarnessConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedHarnessConfig {
    pub config: HarnessConfig,
    pub source: PathBuf,
}

impl HarnessConfig {
    pub const ENV_CONFIG_PATH: &str = "METRON_CONFIG";

    /// Load configuration from disk, respecting the `METRON_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedHarnessConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedHarnessConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedHarnessConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<HarnessConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Static context fields converted to measurement values, in file order.
    pub fn context_fields(&self) -> Vec<(String, Value)> {
        self.context
            .iter()
            .map(|(key, value)| (key.clone(), toml_to_value(value)))
            .collect()
    }

    /// Whether any sink is enabled.
    pub fn has_sinks(&self) -> bool {
        self.console.enabled
            || self.json_file.enabled
            || self.log_sink.enabled
            || self.prometheus.enabled
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.job.validate()?;
        if !self.has_sinks() {
            return Err(anyhow!("configuration must enable at least one sink"));
        }
        self.json_file.validate()?;
        self.log_sink.validate()?;
        self.prometheus.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for HarnessConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: HarnessConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(text) => Value::Text(text.clone()),
        toml::Value::Integer(number) => Value::Integer(*number),
        toml::Value::Float(number) => Value::Number(*number),
        toml::Value::Boolean(flag) => Value::Bool(*flag),
        toml::Value::Datetime(datetime) => {
            let text = datetime.to_string();
            // Local dates and times carry no offset and stay text.
            match DateTime::parse_from_rfc3339(&text) {
                Ok(instant) => Value::Timestamp(instant.with_timezone(&Utc)),
                Err(_) => Value::Text(text),
            }
        }
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Text(table.to_string()),
    }
}

/// Delivery policy as spelled in configuration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    #[default]
    BestEffort,
    Strict,
}

impl From<Delivery> for DeliveryPolicy {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::BestEffort => DeliveryPolicy::BestEffort,
            Delivery::Strict => DeliveryPolicy::Strict,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_job_name")]
    pub name: String,
    /// Request the source's single summary record instead of detailed records.
    #[serde(default = "default_aggregate")]
    pub aggregate: bool,
    #[serde(default)]
    pub delivery: Delivery,
    /// Total time the sample workload spends working.
    #[serde(default = "default_work_duration")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub work: Duration,
    /// Number of laps the sample workload is split into.
    #[serde(default = "default_laps")]
    pub laps: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            aggregate: default_aggregate(),
            delivery: Delivery::default(),
            work: default_work_duration(),
            laps: default_laps(),
        }
    }
}

impl JobConfig {
    pub fn report_mode(&self) -> ReportMode {
        ReportMode::from_aggregate(self.aggregate)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        self.delivery.into()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("job name must not be empty"));
        }
        if self.laps == 0 {
            return Err(anyhow!("job '{}' must run at least one lap", self.name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Also write a daily rolling JSON log under `directory`.
    #[serde(default)]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file: false,
        }
    }
}

/// JSON lines written to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub pretty: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            pretty: false,
        }
    }
}

/// JSON lines appended to a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonFileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl JsonFileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.path.is_none() {
            return Err(anyhow!("json_file sink is enabled but has no path"));
        }
        Ok(())
    }
}

/// Records emitted as tracing events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSinkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_sink_level")]
    pub level: String,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_log_sink_level(),
        }
    }
}

impl LogSinkConfig {
    pub fn level(&self) -> Result<Level> {
        self.level
            .parse::<Level>()
            .map_err(|_| anyhow!("unknown log_sink level '{}'", self.level))
    }

    pub fn validate(&self) -> Result<()> {
        self.level().map(|_| ())
    }
}

/// How pushes treat metrics already stored under the grouping key.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    #[default]
    Replace,
    Add,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub const_labels: IndexMap<String, String>,
    #[serde(default)]
    pub pushgateway: Option<Url>,
    /// Extra grouping labels appended after the job name.
    #[serde(default)]
    pub grouping: IndexMap<String, String>,
    #[serde(default)]
    pub push_mode: PushMode,
    #[serde(default = "default_push_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub push_timeout: Duration,
    /// Serve `/metrics` on this address while the job runs.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespace: default_namespace(),
            const_labels: IndexMap::new(),
            pushgateway: None,
            grouping: IndexMap::new(),
            push_mode: PushMode::default(),
            push_timeout: default_push_timeout(),
            listen: None,
        }
    }
}

impl PrometheusConfig {
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.namespace.chars();
        let valid_head = chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == ':');
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':') {
            return Err(anyhow!(
                "prometheus namespace '{}' is not a valid metric prefix",
                self.namespace
            ));
        }
        if let Some(url) = &self.pushgateway {
            if url.cannot_be_a_base() {
                return Err(anyhow!("pushgateway url {} cannot carry a path", url));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.job.report_mode(), ReportMode::Aggregate);
        assert_eq!(config.job.delivery_policy(), DeliveryPolicy::BestEffort);
        assert!(config.console.enabled);
    }

    #[test]
    fn parses_full_document() {
        let config: HarnessConfig = r#"
            [job]
            name = "nightly-etl"
            aggregate = false
            delivery = "strict"
            work = 0.25
            laps = 2

            [context]
            team = "data"
            shard = 3
            tags = ["a", "b"]

            [console]
            enabled = false

            [log_sink]
            enabled = true
            level = "debug"

            [prometheus]
            enabled = true
            namespace = "etl"
            pushgateway = "http://pushgateway:9091/"
            push_mode = "add"
            push_timeout = 2
            const_labels = { env = "prod" }
            grouping = { instance = "worker-1" }
        "#
        .parse()
        .unwrap();

        assert_eq!(config.job.name, "nightly-etl");
        assert_eq!(config.job.report_mode(), ReportMode::Detailed);
        assert_eq!(config.job.delivery_policy(), DeliveryPolicy::Strict);
        assert_eq!(config.job.work, Duration::from_millis(250));
        assert_eq!(config.log_sink.level().unwrap(), Level::DEBUG);
        assert_eq!(config.prometheus.push_mode, PushMode::Add);
        assert_eq!(config.prometheus.push_timeout, Duration::from_secs(2));
        assert_eq!(config.prometheus.const_labels["env"], "prod");

        let fields = config.context_fields();
        assert_eq!(fields[0], ("team".to_owned(), Value::from("data")));
        assert_eq!(fields[1], ("shard".to_owned(), Value::Integer(3)));
        assert_eq!(
            fields[2].1,
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn context_datetimes_with_offset_become_timestamps() {
        let config: HarnessConfig = r#"
            [context]
            released = 2024-03-01T12:30:00+02:00
            cutoff = 2024-03-01T10:00:00Z
            local = 2024-03-01T10:00:00
            day = 2024-03-01
        "#
        .parse()
        .unwrap();

        let fields: IndexMap<String, Value> = config.context_fields().into_iter().collect();
        let expected: DateTime<Utc> = "2024-03-01T10:30:00Z".parse().unwrap();
        assert_eq!(fields["released"], Value::Timestamp(expected));
        assert!(matches!(fields["cutoff"], Value::Timestamp(_)));
        assert_eq!(fields["local"], Value::from("2024-03-01T10:00:00"));
        assert_eq!(fields["day"], Value::from("2024-03-01"));
    }

    #[test]
    fn rejects_config_without_sinks() {
        let err = "[console]\nenabled = false\n"
            .parse::<HarnessConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("at least one sink"));
    }

    #[test]
    fn rejects_bad_namespace_and_level() {
        assert!("[prometheus]\nenabled = true\nnamespace = \"9bad\"\n"
            .parse::<HarnessConfig>()
            .is_err());
        assert!("[log_sink]\nenabled = true\nlevel = \"loud\"\n"
            .parse::<HarnessConfig>()
            .is_err());
        assert!("[json_file]\nenabled = true\n"
            .parse::<HarnessConfig>()
            .is_err());
    }
}
