//! Source file metadata and digests.

use chrono::{DateTime, Utc};
use md5::Context as Md5Context;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use super::error::ConverterError;
use super::types::{rfc3339, ConversionTask, FileMetadata};

const BUFFER_SIZE: usize = 64 * 1024;

/// Reads the task's content once, hashing it with all three digests.
pub async fn collect(task: &ConversionTask) -> Result<FileMetadata, ConverterError> {
    let path = &task.content_path;
    let unreadable = |e| ConverterError::unreadable(path, e);

    let file = File::open(path).await.map_err(unreadable)?;
    let stat = file.metadata().await.map_err(unreadable)?;

    let mtime: DateTime<Utc> = match task.mtime_hint {
        Some(hint) => hint,
        None => stat.modified().map(DateTime::<Utc>::from).map_err(unreadable)?,
    };

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut sha256 = Sha256::new();
    let mut sha1 = Sha1::new();
    let mut md5 = Md5Context::new();
    let mut size = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer).await.map_err(unreadable)?;
        if bytes_read == 0 {
            break;
        }
        let chunk = &buffer[..bytes_read];
        sha256.update(chunk);
        sha1.update(chunk);
        md5.consume(chunk);
        size += bytes_read as u64;
    }

    Ok(FileMetadata {
        size,
        mtime: epoch_seconds(mtime),
        mtime_iso: rfc3339(mtime),
        sha256: format!("{:x}", sha256.finalize()),
        sha1: format!("{:x}", sha1.finalize()),
        md5: format!("{:x}", md5.compute()),
    })
}

fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ErrorKind;
    use crate::fingerprint::{Fingerprint, TypeTag};
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn task_for(path: &std::path::Path) -> ConversionTask {
        ConversionTask::top_level(path, Fingerprint::of(TypeTag::Txt))
    }

    #[tokio::test]
    async fn test_known_digests() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let meta = collect(&task_for(&path)).await.unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(
            meta.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(meta.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(meta.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert!(meta.mtime > 0.0);
    }

    #[tokio::test]
    async fn test_mtime_hint_overrides_filesystem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.bin");
        tokio::fs::write(&path, b"").await.unwrap();

        let mut task = task_for(&path);
        task.mtime_hint = Some(Utc.with_ymd_and_hms(2020, 5, 17, 12, 30, 0).unwrap());

        let meta = collect(&task).await.unwrap();
        assert_eq!(meta.size, 0);
        assert_eq!(meta.mtime, 1_589_718_600.0);
        assert!(meta.mtime_iso.starts_with("2020-05-17T12:30:00"));
        assert!(meta.mtime_iso.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let task = task_for(&PathBuf::from("/nonexistent/jsonify/missing.txt"));
        let err = collect(&task).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadableFile);
    }
}
