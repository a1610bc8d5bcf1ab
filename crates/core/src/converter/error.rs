//! Error types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stable classification of a per-file failure, written verbatim to output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Source could not be opened or read.
    UnreadableFile,
    /// The backend for the detected type is not available.
    MissingDependency,
    /// The backend rejected the content as malformed.
    CorruptInput,
    /// Archive nesting went past the configured limit.
    MaxDepthExceeded,
    /// Output already present and overwrite was not requested.
    AlreadyExists,
    /// Type excluded by the format allow-list.
    Unsupported,
    /// The result could not be written to the output directory.
    OutputWriteFailed,
    /// A converter panicked or a worker task died.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnreadableFile => "UnreadableFile",
            Self::MissingDependency => "MissingDependency",
            Self::CorruptInput => "CorruptInput",
            Self::MaxDepthExceeded => "MaxDepthExceeded",
            Self::AlreadyExists => "AlreadyExists",
            Self::Unsupported => "Unsupported",
            Self::OutputWriteFailed => "OutputWriteFailed",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while converting a single file.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Source file could not be read.
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend compiled out or otherwise unusable.
    #[error("{backend} support is not available: {reason}")]
    MissingDependency { backend: String, reason: String },

    /// Content is malformed for its format.
    #[error("Corrupt input: {reason}")]
    CorruptInput { reason: String },

    /// Archive nesting limit reached.
    #[error("Maximum archive depth of {max_depth} exceeded")]
    MaxDepthExceeded { max_depth: usize },

    /// Unexpected failure inside the converter.
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates an unreadable-source error.
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// Creates a missing backend error.
    pub fn missing_dependency(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingDependency {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Creates a corrupt input error.
    pub fn corrupt(reason: impl fmt::Display) -> Self {
        Self::CorruptInput {
            reason: reason.to_string(),
        }
    }

    /// Creates an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// The stable kind recorded for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreadable { .. } | Self::Io(_) => ErrorKind::UnreadableFile,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::CorruptInput { .. } => ErrorKind::CorruptInput,
            Self::MaxDepthExceeded { .. } => ErrorKind::MaxDepthExceeded,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for ConverterError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            Self::internal(format!("converter panicked: {}", panic_message(e.into_panic())))
        } else {
            Self::internal("converter task was cancelled")
        }
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            ConverterError::unreadable("/x", io).kind(),
            ErrorKind::UnreadableFile
        );
        assert_eq!(
            ConverterError::corrupt("bad header").kind(),
            ErrorKind::CorruptInput
        );
        assert_eq!(
            ConverterError::missing_dependency("evtx", "compiled out").kind(),
            ErrorKind::MissingDependency
        );
    }

    #[test]
    fn test_kind_serializes_verbatim() {
        for kind in [ErrorKind::CorruptInput, ErrorKind::OutputWriteFailed] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[tokio::test]
    async fn test_panicking_blocking_task_is_internal() {
        let joined: Result<(), _> = tokio::task::spawn_blocking(|| panic!("boom")).await;
        let err: ConverterError = joined.unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("boom"));
    }
}
