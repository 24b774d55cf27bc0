//! ---
//! metron_section: "01-measurement-core"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Per-session context merged into every emitted record."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use crate::record::Record;
use crate::value::Value;

/// Context field naming the measured source.
pub const SOURCE_FIELD: &str = "source";
/// Context field listing the registered sinks, in registration order.
pub const SINKS_FIELD: &str = "sinks";

/// Extra key/value pairs attached to every record a session emits.
///
/// The context has two layers. The base layer holds the descriptive fields a
/// session seeds at construction; the extra layer holds everything written via
/// [`Context::set`]. Merging applies base, then extra, then the record itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    base: Record,
    extra: Record,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seeded(source_kind: &str, sink_kinds: Vec<String>) -> Self {
        let base = Record::new()
            .with(SOURCE_FIELD, source_kind)
            .with(SINKS_FIELD, sink_kinds);
        Self {
            base,
            extra: Record::new(),
        }
    }

    /// Set a context field. Later writes replace earlier ones.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.extra.insert(key, value);
        self
    }

    /// Effective value for `key`, honouring overrides.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).or_else(|| self.base.get(key))
    }

    /// Flattened view of the context.
    pub fn snapshot(&self) -> Record {
        let mut merged = self.base.clone();
        merged.overlay(&self.extra);
        merged
    }

    /// Merge a report record into a copy of the context. Record fields win.
    pub fn merge(&self, record: &Record) -> Record {
        let mut merged = self.snapshot();
        merged.overlay(record);
        merged
    }
}

impl<K, V> Extend<(K, V)> for Context
where
    K: Into<String>,
    V: Into<Value>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.extra.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn record_fields_override_context_fields() {
        let mut context = Context::new();
        context.set("a", 1).set("b", 2);
        let merged = context.merge(&record! { "b" => 3, "c" => 4 });
        assert_eq!(merged, record! { "a" => 1, "b" => 3, "c" => 4 });
    }

    #[test]
    fn set_overrides_seeded_metadata() {
        let mut context = Context::seeded("Stopwatch", vec!["console".to_owned()]);
        assert_eq!(context.get(SOURCE_FIELD), Some(&Value::from("Stopwatch")));
        context.set(SOURCE_FIELD, "nightly-export");
        let snapshot = context.snapshot();
        assert_eq!(snapshot.get(SOURCE_FIELD), Some(&Value::from("nightly-export")));
        assert_eq!(snapshot.get(SINKS_FIELD), Some(&Value::from(vec!["console"])));
    }

    #[test]
    fn later_writes_win() {
        let mut context = Context::new();
        context.set("attempt", 1);
        context.extend([("attempt", 2)]);
        assert_eq!(context.get("attempt"), Some(&Value::Integer(2)));
    }
}
