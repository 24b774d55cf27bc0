//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "JSON lines sink for console and file output."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use metron_core::{Record, Sink, SinkResult};
use parking_lot::Mutex;

/// Writes each record as one JSON document followed by a newline.
///
/// Writes are serialised through an internal lock and flushed after every
/// record, so concurrent sessions never interleave partial lines.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    kind: String,
    pretty: bool,
    writer: Mutex<W>,
}

impl JsonLinesSink<Stdout> {
    /// Default kind for the console sink.
    pub const CONSOLE: &'static str = "console";

    /// Console sink writing to stdout.
    pub fn stdout() -> Self {
        Self::new(Self::CONSOLE, io::stdout())
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// File sink appending to `path`, creating it if needed.
    pub fn append_to(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new("json-file", BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Sink named `kind` writing to `writer`.
    pub fn new(kind: impl Into<String>, writer: W) -> Self {
        Self {
            kind: kind.into(),
            pretty: false,
            writer: Mutex::new(writer),
        }
    }

    /// Pretty-print each record. Output is then no longer one line per record.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Override the reported sink kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn push(&self, record: &Record) -> SinkResult<()> {
        let line = if self.pretty {
            serde_json::to_vec_pretty(record)?
        } else {
            serde_json::to_vec(record)?
        };
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metron_core::record;

    #[test]
    fn writes_one_line_per_record() {
        let sink = JsonLinesSink::new("buffer", Vec::new());
        sink.push(&record! { "job" => "nightly", "rows" => 10 }).unwrap();
        sink.push(&record! { "job" => "nightly", "rows" => 12 }).unwrap();
        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines, vec![r#"{"job":"nightly","rows":10}"#, r#"{"job":"nightly","rows":12}"#]);
    }

    #[test]
    fn appends_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        for rows in [1, 2] {
            let sink = JsonLinesSink::append_to(&path).unwrap();
            sink.push(&record! { "rows" => rows }).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"rows\":1}\n{\"rows\":2}\n");
    }

    #[test]
    fn write_failures_surface_as_sink_errors() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let sink = JsonLinesSink::new("broken", Broken);
        let err = sink.push(&record! { "rows" => 1 }).unwrap_err();
        assert!(matches!(err, metron_core::SinkError::Io(_)));
    }
}
