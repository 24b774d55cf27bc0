//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Console, log, and in-memory sinks."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Record sinks that need nothing beyond a writer or the tracing subscriber.

pub mod json;
pub mod log;
pub mod memory;

pub use json::JsonLinesSink;
pub use log::TracingSink;
pub use memory::MemorySink;
