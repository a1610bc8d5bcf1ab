//! Configuration for a single run.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::config::{parse_formats, validate_config, Config, ConfigError, OutputConfig};
use crate::converter::ConverterConfig;
use crate::fingerprint::TypeTag;

/// Everything a run needs, resolved and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// File or directory to convert.
    pub input: PathBuf,
    /// Where per-file outputs and `master.json` go.
    pub output_dir: PathBuf,
    pub output: OutputConfig,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Types to convert. Everything when `None`.
    pub formats: Option<BTreeSet<TypeTag>>,
    pub limits: ConverterConfig,
}

impl RunConfig {
    /// Run with default settings.
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            output: defaults.output,
            workers: defaults.scheduler.workers,
            formats: None,
            limits: defaults.limits,
        }
    }

    /// Validates `config` and resolves it for the given paths.
    pub fn from_config(
        config: &Config,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        validate_config(config)?;
        Ok(Self {
            input: input.into(),
            output_dir: output_dir.into(),
            output: config.output.clone(),
            workers: config.scheduler.workers,
            formats: parse_formats(config.scheduler.formats.as_deref())?,
            limits: config.limits.clone(),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = TypeTag>) -> Self {
        self.formats = Some(formats.into_iter().collect());
        self
    }

    pub fn with_combine(mut self, combine: bool) -> Self {
        self.output.combine = combine;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.output.overwrite = overwrite;
        self
    }

    pub fn with_limits(mut self, limits: ConverterConfig) -> Self {
        self.limits = limits;
        self
    }
}
