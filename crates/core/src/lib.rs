pub mod aggregate;
pub mod config;
pub mod converter;
pub mod dispatch;
pub mod fingerprint;
pub mod registry;
pub mod scheduler;
pub mod testing;

pub use aggregate::{BatchCounts, BatchReport, OutputWriter};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, OutputConfig,
    SchedulerConfig,
};
pub use converter::{
    BackendCapabilities, ConversionFailure, ConversionResult, ConversionTask, Converter,
    ConverterConfig, ConverterError, ErrorKind, FileMetadata, SkipReason, SkippedFile,
    TaskOutcome,
};
pub use dispatch::Dispatcher;
pub use fingerprint::{detect, Fingerprint, TypeTag};
pub use registry::{ConverterRegistry, FormatInfo, Resolution};
pub use scheduler::{RunConfig, RunSummary, Scheduler, SchedulerError};
