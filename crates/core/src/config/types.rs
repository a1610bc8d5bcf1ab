use serde::{Deserialize, Serialize};

use crate::converter::ConverterConfig;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub limits: ConverterConfig,
}

/// What gets written to the output directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Also write `master.json` with every outcome.
    #[serde(default)]
    pub combine: bool,
    /// Replace existing per-file outputs instead of skipping the file.
    #[serde(default)]
    pub overwrite: bool,
    /// Indent output JSON.
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            combine: false,
            overwrite: false,
            pretty: default_pretty(),
        }
    }
}

fn default_pretty() -> bool {
    true
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Type names to convert; everything else is skipped. All types when unset.
    #[serde(default)]
    pub formats: Option<Vec<String>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            formats: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
