//! ---
//! metron_section: "04-configuration-logging"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Configuration and logging shared by Metron binaries."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
//! Configuration loading and tracing setup consumed by the Metron binaries.

pub mod config;
pub mod logging;

pub use config::{
    ConsoleConfig, Delivery, HarnessConfig, JobConfig, JsonFileConfig, LoadedHarnessConfig,
    LogSinkConfig, LoggingConfig, PrometheusConfig, PushMode,
};
pub use logging::{env_filter, init_tracing, LogFormat, LOG_ENV};
