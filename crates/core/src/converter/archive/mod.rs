//! Archive expansion: zip, tar, tar.gz and single-member gzip.
//!
//! Expansion runs in two phases. The container is listed on the blocking
//! pool and every admissible file entry is written to a private scratch
//! directory; entries whose depth would exceed `max_depth` are never
//! extracted. The materialized entries then go back through the dispatcher
//! one by one, inside the worker that is converting the archive.
//!
//! A corrupt container fails as a whole. A failing entry only shows up in
//! its own entry record.

mod extract;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dispatch::Dispatcher;
use crate::fingerprint::{self, TypeTag};

use super::error::{ConverterError, ErrorKind};
use super::traits::{run_blocking, Converter};
use super::types::{rfc3339, ConversionTask, TaskOutcome};

use extract::{ArchiveKind, Disposition, EntryRecord, Limits};

pub struct ArchiveConverter;

#[async_trait]
impl Converter for ArchiveConverter {
    fn name(&self) -> &str {
        "archive"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Zip, TypeTag::Tar, TypeTag::Gzip]
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let kind = match task.detected_type {
            TypeTag::Zip => ArchiveKind::Zip,
            TypeTag::Tar => ArchiveKind::Tar,
            TypeTag::Gzip => ArchiveKind::Gzip,
            other => {
                return Err(ConverterError::internal(format!(
                    "archive converter cannot handle {other}"
                )))
            }
        };

        let config = ctx.config();
        let limits = Limits {
            child_depth: task.recursion_depth + 1,
            max_depth: config.max_depth,
            max_entries: config.max_archive_entries,
            max_entry_bytes: config.max_entry_bytes,
            max_total_bytes: config.max_archive_bytes,
        };

        let temp_root = config.temp_root();
        let workdir = run_blocking(move || {
            std::fs::create_dir_all(&temp_root)
                .and_then(|()| {
                    tempfile::Builder::new()
                        .prefix("jsonify-")
                        .tempdir_in(&temp_root)
                })
                .map_err(|e| {
                    ConverterError::internal(format!(
                        "cannot create scratch directory in {}: {e}",
                        temp_root.display()
                    ))
                })
        })
        .await?;

        let path = task.content_path.clone();
        let dir = workdir.path().to_path_buf();
        let listing = run_blocking(move || extract::extract(&path, kind, &limits, &dir)).await?;

        debug!(
            archive = %task.source_path,
            entries = listing.entries.len(),
            depth = task.recursion_depth,
            "Expanding archive"
        );

        let fallback_mtime = parent_mtime(task).await;
        let mut entries = Vec::with_capacity(listing.entries.len());
        for record in listing.entries {
            entries.push(entry_value(task, record, fallback_mtime, ctx).await);
        }

        let cleanup = run_blocking(move || workdir.close().map_err(ConverterError::Io)).await;
        if let Err(e) = cleanup {
            debug!(archive = %task.source_path, error = %e, "Scratch directory cleanup failed");
        }

        Ok(json!({
            "archive_type": listing.archive_type,
            "file_count": entries.len(),
            "entries": entries,
            "truncated": listing.truncated,
            "entries_omitted": listing.entries_omitted,
        }))
    }
}

/// Modification time given to entries whose header carries none.
///
/// The scratch copy is never consulted, so repeated runs see the same value.
async fn parent_mtime(task: &ConversionTask) -> DateTime<Utc> {
    if let Some(hint) = task.mtime_hint {
        return hint;
    }
    tokio::fs::metadata(&task.content_path)
        .await
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Converts one entry (if materialized) and renders its record.
async fn entry_value(
    parent: &ConversionTask,
    record: EntryRecord,
    fallback_mtime: DateTime<Utc>,
    ctx: &Dispatcher,
) -> Value {
    let depth = parent.recursion_depth + 1;
    let mut obj = Map::new();
    obj.insert("name".into(), json!(record.name));
    obj.insert("size".into(), json!(record.size));
    if let Some(compressed) = record.compressed_size {
        obj.insert("compressed_size".into(), json!(compressed));
    }
    obj.insert("is_directory".into(), json!(record.is_directory));
    if let Some(mode) = record.mode {
        obj.insert("mode".into(), json!(format!("0o{:o}", mode & 0o7777)));
    }
    if let Some(mtime) = record.mtime {
        obj.insert("mtime".into(), json!(rfc3339(mtime)));
    }
    obj.insert("depth".into(), json!(depth));

    match record.disposition {
        Disposition::Directory => {
            obj.insert("status".into(), json!("directory"));
        }
        Disposition::DepthExceeded => {
            obj.insert("status".into(), json!(ErrorKind::MaxDepthExceeded.as_str()));
            obj.insert(
                "reason".into(),
                json!(ConverterError::MaxDepthExceeded {
                    max_depth: ctx.config().max_depth
                }
                .to_string()),
            );
        }
        Disposition::Skipped(reason) => {
            obj.insert("status".into(), json!("skipped"));
            obj.insert("reason".into(), json!(reason));
        }
        Disposition::Failed(reason) => {
            obj.insert("status".into(), json!("failed"));
            obj.insert(
                "failure".into(),
                json!({
                    "source_path": format!("{}!/{}", parent.source_path, record.name),
                    "detected_type": TypeTag::Unknown,
                    "error_kind": ErrorKind::CorruptInput,
                    "error_message": reason,
                }),
            );
        }
        Disposition::Materialized(path) => {
            let probe = path.clone();
            let detected = run_blocking(move || Ok(fingerprint::detect(&probe)))
                .await
                .unwrap_or_else(|_| fingerprint::Fingerprint::unknown());
            let mtime = record.mtime.unwrap_or(fallback_mtime);
            let child = parent.nested(&record.name, path, detected, Some(mtime));
            let outcome = ctx.dispatch_nested(child).await;

            obj.insert("status".into(), json!(outcome.status()));
            match outcome {
                TaskOutcome::Converted(result) => {
                    obj.insert("result".into(), serde_json::to_value(result).unwrap_or(Value::Null));
                }
                TaskOutcome::Failed(failure) => {
                    obj.insert("failure".into(), serde_json::to_value(failure).unwrap_or(Value::Null));
                }
                TaskOutcome::Skipped(skipped) => {
                    obj.insert("reason".into(), json!(skipped.reason));
                }
            }
        }
    }
    Value::Object(obj)
}
