//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Sink emitting records as structured tracing events."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use metron_core::{Record, Sink, SinkResult};
use tracing::Level;

/// Emits every record as one `tracing` event carrying the JSON payload.
#[derive(Debug, Clone)]
pub struct TracingSink {
    kind: String,
    level: Level,
}

impl TracingSink {
    /// Default sink kind.
    pub const KIND: &'static str = "log";

    /// Sink logging at `INFO`.
    pub fn new() -> Self {
        Self::with_level(Level::INFO)
    }

    /// Sink logging at `level`.
    pub fn with_level(level: Level) -> Self {
        Self {
            kind: Self::KIND.to_owned(),
            level,
        }
    }

    /// Override the reported sink kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Level events are emitted at.
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for TracingSink {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn push(&self, record: &Record) -> SinkResult<()> {
        let payload = serde_json::to_string(record)?;
        let sink = self.kind.as_str();
        // Event levels must be static, so dispatch per level.
        if self.level == Level::ERROR {
            tracing::error!(sink, fields = record.len(), record = %payload, "measurement record");
        } else if self.level == Level::WARN {
            tracing::warn!(sink, fields = record.len(), record = %payload, "measurement record");
        } else if self.level == Level::INFO {
            tracing::info!(sink, fields = record.len(), record = %payload, "measurement record");
        } else if self.level == Level::DEBUG {
            tracing::debug!(sink, fields = record.len(), record = %payload, "measurement record");
        } else {
            tracing::trace!(sink, fields = record.len(), record = %payload, "measurement record");
        }
        Ok(())
    }
}
