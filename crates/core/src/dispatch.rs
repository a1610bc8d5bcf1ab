//! Runs one conversion task end to end.
//!
//! The dispatcher resolves the task's type against the registry, enforces
//! the depth limit, collects file metadata and runs the converter. Whatever
//! happens, it returns exactly one [`TaskOutcome`]; a converter panic is
//! caught here and reported as an `Internal` failure.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::converter::{
    metadata, panic_message, ConversionFailure, ConversionResult, ConversionTask, ConverterConfig,
    ConverterError, SkipReason, SkippedFile, TaskOutcome,
};
use crate::registry::{ConverterRegistry, Resolution};

/// Shared conversion context handed to every converter.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConverterRegistry>,
    config: Arc<ConverterConfig>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConverterRegistry>, config: Arc<ConverterConfig>) -> Self {
        Self { registry, config }
    }

    /// Limits that converters must honor.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Converts one task and classifies the result.
    pub async fn dispatch(&self, task: ConversionTask) -> TaskOutcome {
        let converter = match self.registry.resolve(task.detected_type) {
            Resolution::Convert(converter) => converter,
            Resolution::Skipped => {
                debug!(path = %task.source_path, file_type = %task.detected_type, "Type not selected, skipping");
                return TaskOutcome::Skipped(SkippedFile::new(&task, SkipReason::Unsupported));
            }
            Resolution::Unavailable { converter, reason } => {
                let error = ConverterError::missing_dependency(converter, reason);
                return self.failed(&task, &error);
            }
        };

        if task.recursion_depth > self.config.max_depth {
            let error = ConverterError::MaxDepthExceeded {
                max_depth: self.config.max_depth,
            };
            return self.failed(&task, &error);
        }

        let metadata = match metadata::collect(&task).await {
            Ok(metadata) => metadata,
            Err(e) => return self.failed(&task, &e),
        };

        debug!(
            path = %task.source_path,
            converter = converter.name(),
            depth = task.recursion_depth,
            "Converting"
        );

        let converted = AssertUnwindSafe(converter.convert(&task, self))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ConverterError::internal(format!(
                    "converter panicked: {}",
                    panic_message(panic)
                )))
            });

        match converted {
            Ok(data) => TaskOutcome::Converted(ConversionResult::new(&task, metadata, data)),
            Err(e) => self.failed(&task, &e),
        }
    }

    /// Boxed form of [`dispatch`](Self::dispatch) for recursive use by
    /// archive converters.
    pub fn dispatch_nested(&self, task: ConversionTask) -> BoxFuture<'_, TaskOutcome> {
        Box::pin(self.dispatch(task))
    }

    fn failed(&self, task: &ConversionTask, error: &ConverterError) -> TaskOutcome {
        if task.recursion_depth == 0 {
            warn!(path = %task.source_path, kind = %error.kind(), error = %error, "Conversion failed");
        } else {
            debug!(path = %task.source_path, kind = %error.kind(), error = %error, "Archive entry failed");
        }
        TaskOutcome::Failed(ConversionFailure::from_error(task, error))
    }
}
