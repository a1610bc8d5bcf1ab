//! Types for the converter module.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fingerprint::{Fingerprint, TypeTag};

use super::error::{ConverterError, ErrorKind};

/// One unit of work: converting exactly one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionTask {
    /// Absolute path, or `archive!/entry` for nested entries.
    pub source_path: String,
    /// Where the bytes can actually be read.
    pub content_path: PathBuf,
    pub source_filename: String,
    pub detected_type: TypeTag,
    pub mimetype: String,
    /// 0 for top-level files, +1 per archive level.
    pub recursion_depth: usize,
    /// Virtual path of the containing archive.
    pub origin_archive: Option<String>,
    /// Modification time taken from the archive header.
    pub mtime_hint: Option<DateTime<Utc>>,
}

impl ConversionTask {
    /// Task for a file found on disk.
    pub fn top_level(path: &Path, fingerprint: Fingerprint) -> Self {
        Self {
            source_path: path.to_string_lossy().into_owned(),
            content_path: path.to_path_buf(),
            source_filename: file_name_of(path),
            detected_type: fingerprint.type_tag,
            mimetype: fingerprint.mimetype,
            recursion_depth: 0,
            origin_archive: None,
            mtime_hint: None,
        }
    }

    /// Task for an archive entry materialized at `content_path`.
    pub fn nested(
        &self,
        entry_name: &str,
        content_path: PathBuf,
        fingerprint: Fingerprint,
        mtime_hint: Option<DateTime<Utc>>,
    ) -> Self {
        let source_filename = entry_name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(entry_name)
            .to_string();
        Self {
            source_path: format!("{}!/{}", self.source_path, entry_name),
            content_path,
            source_filename,
            detected_type: fingerprint.type_tag,
            mimetype: fingerprint.mimetype,
            recursion_depth: self.recursion_depth + 1,
            origin_archive: Some(self.source_path.clone()),
            mtime_hint,
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Size, timestamps and digests of the source bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    /// Seconds since the epoch.
    pub mtime: f64,
    pub mtime_iso: String,
    pub sha256: String,
    pub sha1: String,
    pub md5: String,
}

/// A successful conversion, as written to `<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_filename: String,
    pub source_path: String,
    pub detected_type: TypeTag,
    pub mimetype: String,
    pub converted_at: String,
    pub metadata: FileMetadata,
    pub data: serde_json::Value,
}

impl ConversionResult {
    /// Wraps a converter payload.
    pub fn new(task: &ConversionTask, metadata: FileMetadata, data: serde_json::Value) -> Self {
        Self {
            source_filename: task.source_filename.clone(),
            source_path: task.source_path.clone(),
            detected_type: task.detected_type,
            mimetype: task.mimetype.clone(),
            converted_at: rfc3339(Utc::now()),
            metadata,
            data,
        }
    }
}

/// A per-file failure, as written to `<name>.error.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFailure {
    pub source_path: String,
    pub detected_type: TypeTag,
    pub error_kind: ErrorKind,
    pub error_message: String,
}

impl ConversionFailure {
    pub fn new(
        task: &ConversionTask,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            source_path: task.source_path.clone(),
            detected_type: task.detected_type,
            error_kind,
            error_message: error_message.into(),
        }
    }

    pub fn from_error(task: &ConversionTask, error: &ConverterError) -> Self {
        Self::new(task, error.kind(), error.to_string())
    }
}

/// Why a file was not converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Excluded by the format allow-list.
    Unsupported,
    /// Output exists and overwrite is off.
    AlreadyExists,
    /// The run was interrupted before the file was started.
    Cancelled,
}

/// A file that was deliberately not converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub source_path: String,
    pub detected_type: TypeTag,
    pub reason: SkipReason,
}

impl SkippedFile {
    pub fn new(task: &ConversionTask, reason: SkipReason) -> Self {
        Self {
            source_path: task.source_path.clone(),
            detected_type: task.detected_type,
            reason,
        }
    }
}

/// Exactly one of these is produced per task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Converted(ConversionResult),
    Failed(ConversionFailure),
    Skipped(SkippedFile),
}

impl TaskOutcome {
    pub fn source_path(&self) -> &str {
        match self {
            Self::Converted(r) => &r.source_path,
            Self::Failed(f) => &f.source_path,
            Self::Skipped(s) => &s.source_path,
        }
    }

    pub fn detected_type(&self) -> TypeTag {
        match self {
            Self::Converted(r) => r.detected_type,
            Self::Failed(f) => f.detected_type,
            Self::Skipped(s) => s.detected_type,
        }
    }

    /// Short status label used in archive entry listings.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Converted(_) => "converted",
            Self::Failed(f) if f.error_kind == ErrorKind::MaxDepthExceeded => "MaxDepthExceeded",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// Formats a timestamp the way every output field does.
pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
