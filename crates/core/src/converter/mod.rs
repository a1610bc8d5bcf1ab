//! Converter module for turning artifact files into JSON.
//!
//! This module provides the `Converter` trait and one implementation per
//! supported format family. Each converter turns the bytes of one file into
//! a format-specific JSON payload; the dispatcher wraps that payload with
//! file metadata into a [`ConversionResult`].
//!
//! # Formats
//!
//! - Windows event logs (EVTX, feature `evtx`)
//! - Packet captures (PCAP and PCAPNG)
//! - CSV, JSON, XML, plain text and logs
//! - PDF (feature `pdf`) and DOCX documents
//! - ZIP, TAR, TAR.GZ and GZIP archives, expanded recursively
//! - Anything else, described as an opaque binary
//!
//! # Example
//!
//! ```ignore
//! use jsonify_core::{ConverterRegistry, ConverterConfig, Dispatcher};
//!
//! let registry = Arc::new(ConverterRegistry::with_defaults());
//! let dispatcher = Dispatcher::new(registry, Arc::new(ConverterConfig::default()));
//!
//! let fp = jsonify_core::fingerprint::detect(&path);
//! match dispatcher.dispatch(ConversionTask::top_level(&path, fp)).await {
//!     TaskOutcome::Converted(result) => println!("{}", result.data),
//!     TaskOutcome::Failed(failure) => eprintln!("{}", failure.error_message),
//!     TaskOutcome::Skipped(_) => {}
//! }
//! ```

mod archive;
mod binary;
mod capabilities;
mod config;
mod csv;
mod docx;
pub(crate) mod error;
mod evtx;
mod json;
pub mod metadata;
mod pcap;
mod pdf;
mod text;
mod traits;
mod types;
mod xml;

pub use self::archive::ArchiveConverter;
pub use self::binary::BinaryConverter;
pub use self::capabilities::BackendCapabilities;
pub use self::config::ConverterConfig;
pub use self::csv::CsvConverter;
pub use self::docx::DocxConverter;
pub use self::error::{ConverterError, ErrorKind};
pub use self::evtx::EvtxConverter;
pub use self::json::JsonConverter;
pub use self::pcap::PcapConverter;
pub use self::pdf::PdfConverter;
pub use self::text::TextConverter;
pub use self::traits::Converter;
pub use self::types::{
    rfc3339, ConversionFailure, ConversionResult, ConversionTask, FileMetadata, SkipReason,
    SkippedFile, TaskOutcome,
};
pub use self::xml::XmlConverter;

pub(crate) use self::error::panic_message;
