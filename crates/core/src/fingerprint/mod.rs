//! File type detection.
//!
//! Identifies a file's format from its leading bytes, falling back to the
//! file name when the content is not conclusive. Detection never fails:
//! anything unreadable or unidentified is reported as `unknown`.
//!
//! # Example
//!
//! ```ignore
//! use jsonify_core::fingerprint::{detect, TypeTag};
//!
//! let fp = detect(Path::new("/cases/42/Security.evtx"));
//! assert_eq!(fp.type_tag, TypeTag::Evtx);
//! ```

mod signature;
mod types;

pub use types::{Fingerprint, TypeTag, UnknownFormat};

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use signature::Sniff;

/// Number of leading bytes inspected.
const SNIFF_LEN: u64 = 8192;

/// Detects the type of the file at `path`.
pub fn detect(path: &Path) -> Fingerprint {
    let header = match read_header(path) {
        Ok(header) => header,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot read file for detection");
            return Fingerprint::unknown();
        }
    };

    if header.is_empty() {
        return Fingerprint::unknown();
    }

    match signature::sniff(path, &header) {
        Sniff::Definite(fp) => fp,
        Sniff::Text => match signature::from_extension(path) {
            Some(fp) if fp.type_tag.is_text() => fp,
            _ => signature::from_text_structure(&header),
        },
        Sniff::Inconclusive => {
            signature::from_extension(path).unwrap_or_else(Fingerprint::unknown)
        }
    }
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut header)?;
    Ok(header)
}
