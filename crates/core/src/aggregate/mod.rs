//! Output side of a batch.
//!
//! Workers send every finished file to a single [`Aggregator`] over a
//! channel. The aggregator owns all mutable batch state: it writes the
//! per-file `.json` / `.error.json` outputs, keeps the counts, and builds
//! the combined report when requested. Output files are written to a
//! temporary sibling and renamed into place.

mod collector;
mod report;
mod writer;

pub use collector::{create_aggregator, AggregateState, Aggregator, Completed};
pub use report::{BatchCounts, BatchReport};
pub use writer::{OutputWriter, MASTER_FILE};
