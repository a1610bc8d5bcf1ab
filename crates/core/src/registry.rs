//! Maps type tags to the converter that handles them.
//!
//! The registry is filled once at start-up and then shared read-only behind
//! an `Arc`. Each converter's availability is checked when it is registered
//! and the answer is cached, so a missing backend costs one check per run
//! rather than one per file.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::converter::{
    ArchiveConverter, BinaryConverter, Converter, CsvConverter, DocxConverter, EvtxConverter,
    JsonConverter, PcapConverter, PdfConverter, TextConverter, XmlConverter,
};
use crate::fingerprint::TypeTag;

/// What to do with a file of a given type.
#[derive(Clone)]
pub enum Resolution {
    /// Convert with this converter.
    Convert(Arc<dyn Converter>),
    /// A converter exists but its backend is not usable.
    Unavailable { converter: String, reason: String },
    /// The type is excluded by the format allow-list.
    Skipped,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Convert(c) => f.debug_tuple("Convert").field(&c.name()).finish(),
            Self::Unavailable { converter, reason } => f
                .debug_struct("Unavailable")
                .field("converter", converter)
                .field("reason", reason)
                .finish(),
            Self::Skipped => f.write_str("Skipped"),
        }
    }
}

#[derive(Clone)]
struct Entry {
    converter: Arc<dyn Converter>,
    availability: Result<(), String>,
}

/// One row of `--list-formats` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    pub type_tag: TypeTag,
    pub converter: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Type tag to converter table.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    entries: HashMap<TypeTag, Entry>,
    allow_list: Option<BTreeSet<TypeTag>>,
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in converter.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EvtxConverter));
        registry.register(Arc::new(PcapConverter));
        registry.register(Arc::new(CsvConverter));
        registry.register(Arc::new(JsonConverter));
        registry.register(Arc::new(XmlConverter));
        registry.register(Arc::new(TextConverter));
        registry.register(Arc::new(PdfConverter));
        registry.register(Arc::new(DocxConverter));
        registry.register(Arc::new(ArchiveConverter));
        registry.register(Arc::new(BinaryConverter));
        registry
    }

    /// Registers a converter for all of its supported types.
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, converter: Arc<dyn Converter>) {
        let availability = converter.availability().map_err(|e| e.to_string());
        match &availability {
            Ok(()) => debug!(converter = converter.name(), "Registered converter"),
            Err(reason) => warn!(
                converter = converter.name(),
                reason = %reason,
                "Converter backend unavailable"
            ),
        }

        for tag in converter.supported_types() {
            self.entries.insert(
                *tag,
                Entry {
                    converter: Arc::clone(&converter),
                    availability: availability.clone(),
                },
            );
        }
    }

    /// Restricts conversion to the given types. `None` allows everything.
    pub fn with_allow_list(mut self, allow_list: Option<BTreeSet<TypeTag>>) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Decides how a file of type `tag` is handled.
    ///
    /// Types without a converter fall back to the `unknown` entry.
    pub fn resolve(&self, tag: TypeTag) -> Resolution {
        if let Some(allowed) = &self.allow_list {
            if !allowed.contains(&tag) {
                return Resolution::Skipped;
            }
        }

        let entry = self
            .entries
            .get(&tag)
            .or_else(|| self.entries.get(&TypeTag::Unknown));

        match entry {
            Some(Entry {
                converter,
                availability: Ok(()),
            }) => Resolution::Convert(Arc::clone(converter)),
            Some(Entry {
                converter,
                availability: Err(reason),
            }) => Resolution::Unavailable {
                converter: converter.name().to_string(),
                reason: reason.clone(),
            },
            None => Resolution::Unavailable {
                converter: "none".to_string(),
                reason: format!("no converter registered for {tag}"),
            },
        }
    }

    /// Lists every type tag with the converter that handles it.
    pub fn formats(&self) -> Vec<FormatInfo> {
        TypeTag::ALL
            .iter()
            .filter_map(|tag| {
                self.entries.get(tag).map(|entry| FormatInfo {
                    type_tag: *tag,
                    converter: entry.converter.name().to_string(),
                    available: entry.availability.is_ok(),
                    reason: entry.availability.clone().err(),
                })
            })
            .collect()
    }
}
