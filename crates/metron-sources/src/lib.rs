//! ---
//! metron_section: "02-sources"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Built-in measured sources."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
#![warn(missing_docs)]

/// Lap timer source and lap summaries.
pub mod laps;
/// Single-interval wall clock source.
pub mod stopwatch;

pub use laps::{Lap, LapMarker, LapSummary, LapTimer};
pub use stopwatch::Stopwatch;
