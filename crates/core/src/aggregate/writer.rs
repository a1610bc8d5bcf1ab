//! Atomic JSON output files.

use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::converter::{ConversionFailure, ErrorKind, TaskOutcome};

const RESULT_SUFFIX: &str = ".json";
const ERROR_SUFFIX: &str = ".error.json";

/// File name of the combined report.
pub const MASTER_FILE: &str = "master.json";

/// Writes per-file results under the output directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    pretty: bool,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            pretty,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output>/<relative>.json`
    pub fn result_path(&self, relative: &Path) -> PathBuf {
        with_suffix(&self.output_dir.join(relative), RESULT_SUFFIX)
    }

    /// `<output>/<relative>.error.json`
    pub fn error_path(&self, relative: &Path) -> PathBuf {
        with_suffix(&self.output_dir.join(relative), ERROR_SUFFIX)
    }

    pub fn master_path(&self) -> PathBuf {
        self.output_dir.join(MASTER_FILE)
    }

    /// Writes the file that belongs to `outcome`.
    ///
    /// Returns the outcome to record: unchanged, or downgraded to an
    /// `OutputWriteFailed` failure when the file could not be written.
    pub async fn write_outcome(&self, relative: &Path, outcome: TaskOutcome) -> TaskOutcome {
        let (target, stale) = match &outcome {
            TaskOutcome::Converted(_) => (self.result_path(relative), self.error_path(relative)),
            TaskOutcome::Failed(_) => (self.error_path(relative), self.result_path(relative)),
            TaskOutcome::Skipped(_) => return outcome,
        };
        let written = match &outcome {
            TaskOutcome::Converted(result) => self.write_json(&target, result).await,
            TaskOutcome::Failed(failure) => self.write_json(&target, failure).await,
            TaskOutcome::Skipped(_) => Ok(()),
        };

        match written {
            Ok(()) => {
                remove_stale(&stale).await;
                outcome
            }
            Err(e) => {
                warn!(path = %target.display(), error = %e, "Failed to write output");
                TaskOutcome::Failed(ConversionFailure {
                    source_path: outcome.source_path().to_string(),
                    detected_type: outcome.detected_type(),
                    error_kind: ErrorKind::OutputWriteFailed,
                    error_message: format!("Cannot write {}: {e}", target.display()),
                })
            }
        }
    }

    /// Serializes `value` and moves it into place with a rename, so readers
    /// never see a partial file.
    pub async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> std::io::Result<()> {
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(std::io::Error::other)?;
        bytes.push(b'\n');

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = temp_sibling(path);
        if let Err(e) = write_then_rename(&temp, path, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote output");
        Ok(())
    }
}

async fn write_then_rename(temp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(temp, bytes).await?;
    fs::rename(temp, path).await
}

async fn remove_stale(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed stale output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale output"),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `.<name>.<uuid>.tmp` next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{
        ConversionResult, ConversionTask, FileMetadata, SkipReason, SkippedFile,
    };
    use crate::fingerprint::{Fingerprint, TypeTag};
    use serde_json::json;
    use tempfile::TempDir;

    fn task() -> ConversionTask {
        ConversionTask::top_level(Path::new("/in/logs/a.csv"), Fingerprint::of(TypeTag::Csv))
    }

    fn converted() -> TaskOutcome {
        let metadata = FileMetadata {
            size: 1,
            mtime: 0.0,
            mtime_iso: "1970-01-01T00:00:00.000000Z".into(),
            sha256: String::new(),
            sha1: String::new(),
            md5: String::new(),
        };
        TaskOutcome::Converted(ConversionResult::new(&task(), metadata, json!({"rows": []})))
    }

    fn failed() -> TaskOutcome {
        TaskOutcome::Failed(ConversionFailure::new(&task(), ErrorKind::CorruptInput, "bad"))
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn test_output_naming() {
        let writer = OutputWriter::new("/out", true);
        let relative = Path::new("logs/a.csv");
        assert_eq!(writer.result_path(relative), PathBuf::from("/out/logs/a.csv.json"));
        assert_eq!(writer.error_path(relative), PathBuf::from("/out/logs/a.csv.error.json"));
        assert_eq!(writer.master_path(), PathBuf::from("/out/master.json"));
    }

    #[tokio::test]
    async fn test_success_replaces_error_file() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        let relative = Path::new("logs/a.csv");

        writer.write_outcome(relative, failed()).await;
        assert!(writer.error_path(relative).exists());

        let outcome = writer.write_outcome(relative, converted()).await;
        assert!(matches!(outcome, TaskOutcome::Converted(_)));
        assert!(writer.result_path(relative).exists());
        assert!(!writer.error_path(relative).exists());

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(writer.result_path(relative)).unwrap()).unwrap();
        assert_eq!(written["source_filename"], "a.csv");
        assert!(leftovers(out.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failure_file_holds_the_failure() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), true);
        let relative = Path::new("a.csv");

        writer.write_outcome(relative, failed()).await;
        let written: ConversionFailure =
            serde_json::from_slice(&std::fs::read(writer.error_path(relative)).unwrap()).unwrap();
        assert_eq!(written.error_kind, ErrorKind::CorruptInput);
    }

    #[tokio::test]
    async fn test_skip_writes_nothing() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), true);
        let skipped = TaskOutcome::Skipped(SkippedFile::new(&task(), SkipReason::Unsupported));

        writer.write_outcome(Path::new("a.csv"), skipped).await;
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_downgrades_outcome() {
        let out = TempDir::new().unwrap();
        // a regular file where a directory is needed
        std::fs::write(out.path().join("logs"), b"").unwrap();
        let writer = OutputWriter::new(out.path(), true);

        let outcome = writer.write_outcome(Path::new("logs/a.csv"), converted()).await;
        let TaskOutcome::Failed(failure) = outcome else {
            panic!("expected a failure");
        };
        assert_eq!(failure.error_kind, ErrorKind::OutputWriteFailed);
        assert_eq!(failure.source_path, "/in/logs/a.csv");
    }
}
