//! Worker pool that converts a batch of files.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::aggregate::{create_aggregator, BatchCounts, BatchReport, Completed, OutputWriter};
use crate::converter::{
    panic_message, ConversionFailure, ConversionTask, ErrorKind, SkipReason, SkippedFile,
    TaskOutcome,
};
use crate::dispatch::Dispatcher;
use crate::fingerprint::{self, Fingerprint};
use crate::registry::ConverterRegistry;

use super::config::RunConfig;
use super::discovery::{discover, DiscoveredFile};

/// Outcomes buffered between workers and the aggregator.
const OUTCOME_BUFFER_SIZE: usize = 256;

/// Fatal errors: nothing was converted.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Input file or directory does not exist.
    #[error("Input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Output directory could not be created.
    #[error("Cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Combined report could not be written.
    #[error("Cannot write combined report {}: {source}", .path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A background task died.
    #[error("Internal scheduler error: {0}")]
    Internal(String),
}

/// Result of a completed or interrupted run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub counts: BatchCounts,
    /// Combined report, when combining.
    pub report: Option<BatchReport>,
    /// Where the combined report was written.
    pub master_path: Option<PathBuf>,
    /// A shutdown was requested before the batch finished.
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Converts every file under the input with a bounded worker pool.
pub struct Scheduler {
    config: RunConfig,
    registry: ConverterRegistry,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    /// Scheduler with the built-in converters and no shutdown signal.
    pub fn new(config: RunConfig) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self {
            config,
            registry: ConverterRegistry::with_defaults(),
            shutdown,
        }
    }

    /// Replaces the converter registry. The format allow-list from the run
    /// config is still applied on top.
    pub fn with_registry(mut self, registry: ConverterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Stops taking new files once `true` is sent.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the batch.
    ///
    /// Per-file problems never make this fail; they are counted and written
    /// as `.error.json` files. Only the preconditions are fatal.
    pub async fn run(&self) -> Result<RunSummary, SchedulerError> {
        let started = Instant::now();
        let input = self.config.input.clone();
        let output_dir = self.config.output_dir.clone();

        if tokio::fs::metadata(&input).await.is_err() {
            return Err(SchedulerError::InputNotFound(input));
        }
        // Source paths in every output are absolute.
        let input = std::path::absolute(&input).map_err(|e| {
            SchedulerError::Internal(format!("cannot resolve {}: {e}", input.display()))
        })?;
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| SchedulerError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;

        let files = {
            let input = input.clone();
            let exclude = output_dir.clone();
            tokio::task::spawn_blocking(move || discover(&input, Some(&exclude)))
                .await
                .map_err(|e| SchedulerError::Internal(format!("file discovery failed: {e}")))?
        };

        if files.is_empty() {
            warn!(input = %input.display(), "No files found");
        } else {
            info!(
                files = files.len(),
                workers = self.config.workers,
                input = %input.display(),
                "Starting batch"
            );
        }

        let registry = self
            .registry
            .clone()
            .with_allow_list(self.config.formats.clone());
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(self.config.limits.clone()));
        let writer = OutputWriter::new(&output_dir, self.config.output.pretty);

        let (tx, aggregator) =
            create_aggregator(writer.clone(), self.config.output.combine, OUTCOME_BUFFER_SIZE);
        let aggregator = tokio::spawn(aggregator.run());

        let total = files.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(files)));
        let progress = Arc::new(AtomicUsize::new(0));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers.max(1).min(total.max(1)) {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&queue),
                tx: tx.clone(),
                dispatcher: dispatcher.clone(),
                writer: writer.clone(),
                overwrite: self.config.output.overwrite,
                shutdown: self.shutdown.clone(),
                progress: Arc::clone(&progress),
                total,
            };
            workers.spawn(worker.run());
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task died");
            }
        }

        // Anything still queued was never started.
        let remaining: Vec<DiscoveredFile> = queue.lock().await.drain(..).collect();
        let cancelled = *self.shutdown.borrow() || !remaining.is_empty();
        if !remaining.is_empty() {
            warn!(files = remaining.len(), "Run interrupted, marking files as cancelled");
        }
        for file in remaining {
            let task = ConversionTask::top_level(&file.path, Fingerprint::unknown());
            let outcome = TaskOutcome::Skipped(SkippedFile::new(&task, SkipReason::Cancelled));
            send(&tx, file.relative, outcome).await;
        }

        drop(tx);
        let state = aggregator
            .await
            .map_err(|e| SchedulerError::Internal(format!("aggregator failed: {e}")))?;

        let master_path = match &state.report {
            Some(report) if !cancelled => {
                let path = writer.master_path();
                writer
                    .write_json(&path, report)
                    .await
                    .map_err(|source| SchedulerError::ReportWrite {
                        path: path.clone(),
                        source,
                    })?;
                info!(path = %path.display(), "Wrote combined report");
                Some(path)
            }
            _ => None,
        };

        let summary = RunSummary {
            counts: state.counts,
            report: state.report,
            master_path,
            cancelled,
            elapsed: started.elapsed(),
        };
        info!(
            total = summary.counts.total,
            converted = summary.counts.converted,
            failed = summary.counts.failed,
            skipped = summary.counts.skipped,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Batch finished"
        );
        Ok(summary)
    }
}

async fn send(tx: &mpsc::Sender<Completed>, relative: PathBuf, outcome: TaskOutcome) {
    if tx.send(Completed { relative, outcome }).await.is_err() {
        error!("Aggregator stopped before all outcomes were delivered");
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<DiscoveredFile>>>,
    tx: mpsc::Sender<Completed>,
    dispatcher: Dispatcher,
    writer: OutputWriter,
    overwrite: bool,
    shutdown: watch::Receiver<bool>,
    progress: Arc<AtomicUsize>,
    total: usize,
}

impl Worker {
    async fn run(self) {
        loop {
            if *self.shutdown.borrow() {
                debug!(worker = self.id, "Shutdown requested, worker stopping");
                break;
            }
            let Some(file) = self.queue.lock().await.pop_front() else {
                break;
            };

            let outcome = AssertUnwindSafe(self.process(&file.path, &file.relative))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let task = ConversionTask::top_level(&file.path, Fingerprint::unknown());
                    TaskOutcome::Failed(ConversionFailure::new(
                        &task,
                        ErrorKind::Internal,
                        format!("worker panicked: {}", panic_message(panic)),
                    ))
                });

            let done = self.progress.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                worker = self.id,
                path = %file.path.display(),
                status = outcome.status(),
                done,
                total = self.total,
                "File finished"
            );
            send(&self.tx, file.relative, outcome).await;
        }
    }

    /// Fingerprint, overwrite check, dispatch.
    async fn process(&self, path: &Path, relative: &Path) -> TaskOutcome {
        let probe = path.to_path_buf();
        let detected = tokio::task::spawn_blocking(move || fingerprint::detect(&probe))
            .await
            .unwrap_or_else(|_| Fingerprint::unknown());
        let task = ConversionTask::top_level(path, detected);

        if !self.overwrite && tokio::fs::try_exists(self.writer.result_path(relative)).await.unwrap_or(false) {
            debug!(path = %task.source_path, "Output exists, skipping");
            return TaskOutcome::Skipped(SkippedFile::new(&task, SkipReason::AlreadyExists));
        }

        self.dispatcher.dispatch(task).await
    }
}
