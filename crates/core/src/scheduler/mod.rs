//! Scheduler module for converting a whole input tree.
//!
//! The scheduler enumerates the input, then runs a fixed number of workers
//! that pull files from one shared queue. Each worker fingerprints its
//! file, checks for an existing output and hands the task to the
//! dispatcher. Finished outcomes go to the aggregator over a channel.
//!
//! # Example
//!
//! ```ignore
//! use jsonify_core::scheduler::{RunConfig, Scheduler};
//!
//! let config = RunConfig::new("/evidence", "/out").with_workers(8).with_combine(true);
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let summary = Scheduler::new(config).with_shutdown(shutdown_rx).run().await?;
//! println!("{} converted, {} failed", summary.counts.converted, summary.counts.failed);
//! ```

mod config;
mod discovery;
mod runner;

pub use config::RunConfig;
pub use discovery::{discover, DiscoveredFile};
pub use runner::{RunSummary, Scheduler, SchedulerError};
