use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::converter::TaskOutcome;

use super::report::{BatchCounts, BatchReport};
use super::writer::OutputWriter;

/// One finished top-level file, as sent by a worker.
#[derive(Debug, Clone)]
pub struct Completed {
    /// Path relative to the input root; names the output file.
    pub relative: PathBuf,
    pub outcome: TaskOutcome,
}

/// What the aggregator hands back once every worker is done.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    pub counts: BatchCounts,
    /// Sorted combined report, only kept when combining.
    pub report: Option<BatchReport>,
}

/// Background task that receives outcomes, writes their output files and
/// keeps the batch totals
pub struct Aggregator {
    rx: mpsc::Receiver<Completed>,
    writer: OutputWriter,
    combine: bool,
}

impl Aggregator {
    pub fn new(rx: mpsc::Receiver<Completed>, writer: OutputWriter, combine: bool) -> Self {
        Self {
            rx,
            writer,
            combine,
        }
    }

    /// Run the aggregator, consuming outcomes until the channel is closed
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) -> AggregateState {
        debug!("Aggregator started");
        let mut state = AggregateState {
            counts: BatchCounts::default(),
            report: self.combine.then(BatchReport::default),
        };

        while let Some(Completed { relative, outcome }) = self.rx.recv().await {
            let outcome = self.writer.write_outcome(&relative, outcome).await;
            if let TaskOutcome::Converted(result) = &outcome {
                info!(path = %result.source_path, file_type = %result.detected_type, "Converted");
            }
            state.counts.record(&outcome);
            if let Some(report) = state.report.as_mut() {
                report.push(outcome);
            }
        }

        if let Some(report) = state.report.as_mut() {
            report.sort();
        }
        debug!(total = state.counts.total, "Aggregator finished");
        state
    }
}

/// Create the outcome channel and the aggregator draining it
///
/// Returns:
/// - `mpsc::Sender<Completed>` - clone one per worker
/// - `Aggregator` - spawn this with `tokio::spawn(aggregator.run())`
pub fn create_aggregator(
    writer: OutputWriter,
    combine: bool,
    buffer_size: usize,
) -> (mpsc::Sender<Completed>, Aggregator) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (tx, Aggregator::new(rx, writer, combine))
}
