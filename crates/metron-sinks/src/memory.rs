//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "In-memory sink retaining pushed records."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use metron_core::{Record, Sink, SinkResult};
use parking_lot::Mutex;

/// Retains every pushed record in push order.
#[derive(Debug)]
pub struct MemorySink {
    kind: String,
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    /// Default sink kind.
    pub const KIND: &'static str = "memory";

    /// Empty sink reporting [`MemorySink::KIND`].
    pub fn new() -> Self {
        Self::with_kind(Self::KIND)
    }

    /// Empty sink reporting `kind`.
    pub fn with_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the records received so far.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Remove and return the records received so far.
    pub fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Number of records received.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MemorySink {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn push(&self, record: &Record) -> SinkResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metron_core::record;

    #[test]
    fn keeps_records_in_push_order() {
        let sink = MemorySink::with_kind("TestSink");
        sink.push(&record! { "i" => 0 }).unwrap();
        sink.push(&record! { "i" => 1 }).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1], record! { "i" => 1 });
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }
}
