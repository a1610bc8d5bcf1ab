//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Limits and switches shared by every converter (the `[limits]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Deepest archive nesting level that is still converted.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Packets decoded per capture.
    #[serde(default = "default_max_packets")]
    pub max_packets: usize,

    /// Records, rows or lines emitted per file.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Pages extracted per PDF.
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,

    /// Entries listed per archive.
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,

    /// Largest single archive entry that is materialized.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,

    /// Total bytes materialized per archive.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Embed a base64 preview of unrecognised binaries.
    #[serde(default)]
    pub include_base64: bool,

    /// Largest binary that gets a base64 preview.
    #[serde(default = "default_base64_limit")]
    pub base64_limit: u64,

    /// Where archive entries are materialized. System temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

fn default_max_depth() -> usize {
    3
}

fn default_max_packets() -> usize {
    10_000
}

fn default_max_records() -> usize {
    100_000
}

fn default_max_pdf_pages() -> usize {
    500
}

fn default_max_archive_entries() -> usize {
    10_000
}

fn default_max_entry_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_max_archive_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_base64_limit() -> u64 {
    1024 * 1024
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_packets: default_max_packets(),
            max_records: default_max_records(),
            max_pdf_pages: default_max_pdf_pages(),
            max_archive_entries: default_max_archive_entries(),
            max_entry_bytes: default_max_entry_bytes(),
            max_archive_bytes: default_max_archive_bytes(),
            include_base64: false,
            base64_limit: default_base64_limit(),
            temp_dir: None,
        }
    }
}

impl ConverterConfig {
    /// Sets the archive nesting limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the packet cap for captures.
    pub fn with_max_packets(mut self, max_packets: usize) -> Self {
        self.max_packets = max_packets;
        self
    }

    /// Sets the per-file record cap.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Enables or disables base64 previews.
    pub fn with_base64(mut self, include: bool) -> Self {
        self.include_base64 = include;
        self
    }

    /// Sets the directory used for materialized archive entries.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = Some(temp_dir);
        self
    }

    /// Resolved directory for temporary files.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_packets, 10_000);
        assert_eq!(config.max_archive_entries, 10_000);
        assert_eq!(config.base64_limit, 1024 * 1024);
        assert!(!config.include_base64);
        assert!(config.temp_dir.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ConverterConfig::default()
            .with_max_depth(5)
            .with_max_packets(10)
            .with_base64(true)
            .with_temp_dir(PathBuf::from("/tmp/jsonify"));

        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_packets, 10);
        assert!(config.include_base64);
        assert_eq!(config.temp_root(), PathBuf::from("/tmp/jsonify"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ConverterConfig = toml::from_str("max_depth = 1").unwrap();
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.max_packets, 10_000);
    }
}
