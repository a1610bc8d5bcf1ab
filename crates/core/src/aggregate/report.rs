//! Batch totals and the combined report.

use serde::{Deserialize, Serialize};

use crate::converter::{ConversionFailure, ConversionResult, SkippedFile, TaskOutcome};

/// Outcome counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub converted: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchCounts {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.total += 1;
        match outcome {
            TaskOutcome::Converted(_) => self.converted += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Contents of `master.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_files: usize,
    pub converted_files: Vec<ConversionResult>,
    pub failed_files: Vec<ConversionFailure>,
    pub skipped_files: Vec<SkippedFile>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: TaskOutcome) {
        self.total_files += 1;
        match outcome {
            TaskOutcome::Converted(result) => self.converted_files.push(result),
            TaskOutcome::Failed(failure) => self.failed_files.push(failure),
            TaskOutcome::Skipped(skipped) => self.skipped_files.push(skipped),
        }
    }

    /// Orders every list by source path so reruns produce identical reports.
    pub fn sort(&mut self) {
        self.converted_files
            .sort_by(|a, b| a.source_path.cmp(&b.source_path));
        self.failed_files
            .sort_by(|a, b| a.source_path.cmp(&b.source_path));
        self.skipped_files
            .sort_by(|a, b| a.source_path.cmp(&b.source_path));
    }
}
