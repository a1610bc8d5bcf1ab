//! Types for the fingerprint module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Short identifier for a detected file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// Windows XML event log
    Evtx,
    /// Legacy libpcap capture
    Pcap,
    /// Next generation capture
    Pcapng,
    Csv,
    Json,
    Xml,
    /// Plain text and log files
    Txt,
    Pdf,
    Docx,
    Zip,
    /// Tar archive, optionally gzip compressed
    Tar,
    /// Single-member gzip stream
    Gzip,
    /// Anything we could not identify
    Unknown,
}

impl TypeTag {
    /// All tags, in registry order.
    pub const ALL: [TypeTag; 13] = [
        Self::Evtx,
        Self::Pcap,
        Self::Pcapng,
        Self::Csv,
        Self::Json,
        Self::Xml,
        Self::Txt,
        Self::Pdf,
        Self::Docx,
        Self::Zip,
        Self::Tar,
        Self::Gzip,
        Self::Unknown,
    ];

    /// Returns the tag as it appears in JSON output and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evtx => "evtx",
            Self::Pcap => "pcap",
            Self::Pcapng => "pcapng",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Txt => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip => "gzip",
            Self::Unknown => "unknown",
        }
    }

    /// Canonical MIME type for this tag.
    pub fn mimetype(&self) -> &'static str {
        match self {
            Self::Evtx => "application/x-evtx",
            Self::Pcap => "application/vnd.tcpdump.pcap",
            Self::Pcapng => "application/x-pcapng",
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Txt => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Zip => "application/zip",
            Self::Tar => "application/x-tar",
            Self::Gzip => "application/gzip",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Whether files of this type are containers handled by the archive expander.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Zip | Self::Tar | Self::Gzip)
    }

    /// Whether this tag is one of the text-based formats.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Csv | Self::Json | Self::Xml | Self::Txt)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a format name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for TypeTag {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = match s.trim().to_ascii_lowercase().as_str() {
            "evtx" => Self::Evtx,
            "pcap" | "cap" => Self::Pcap,
            "pcapng" => Self::Pcapng,
            "csv" => Self::Csv,
            "json" => Self::Json,
            "xml" => Self::Xml,
            "txt" | "text" | "log" => Self::Txt,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "zip" => Self::Zip,
            "tar" | "tgz" => Self::Tar,
            "gzip" | "gz" => Self::Gzip,
            "unknown" | "binary" => Self::Unknown,
            other => return Err(UnknownFormat(other.to_string())),
        };
        Ok(tag)
    }
}

/// Result of fingerprinting a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Detected format.
    pub type_tag: TypeTag,
    /// MIME type string.
    pub mimetype: String,
}

impl Fingerprint {
    /// Fingerprint carrying the canonical MIME type of `tag`.
    pub fn of(tag: TypeTag) -> Self {
        Self {
            type_tag: tag,
            mimetype: tag.mimetype().to_string(),
        }
    }

    /// The sentinel result for unreadable or unidentified files.
    pub fn unknown() -> Self {
        Self::of(TypeTag::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trips_through_str() {
        for tag in TypeTag::ALL {
            assert_eq!(tag.as_str().parse::<TypeTag>().unwrap(), tag);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("LOG".parse::<TypeTag>().unwrap(), TypeTag::Txt);
        assert_eq!("binary".parse::<TypeTag>().unwrap(), TypeTag::Unknown);
        assert_eq!(" tgz ".parse::<TypeTag>().unwrap(), TypeTag::Tar);
    }

    #[test]
    fn test_unknown_format_name() {
        let err = "docm".parse::<TypeTag>().unwrap_err();
        assert_eq!(err, UnknownFormat("docm".to_string()));
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&TypeTag::Pcapng).unwrap();
        assert_eq!(json, "\"pcapng\"");
    }

    #[test]
    fn test_unknown_fingerprint() {
        let fp = Fingerprint::unknown();
        assert_eq!(fp.type_tag, TypeTag::Unknown);
        assert_eq!(fp.mimetype, "application/octet-stream");
    }
}
