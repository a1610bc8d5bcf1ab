//! Magic-byte signatures and extension tables.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use super::types::{Fingerprint, TypeTag};

/// Outcome of inspecting the leading bytes of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sniff {
    /// The content carries an unambiguous signature.
    Definite(Fingerprint),
    /// Decodes as text; the extension or structure has to decide.
    Text,
    /// Nothing recognisable.
    Inconclusive,
}

const EVTX_MAGIC: &[u8] = b"ElfFile\0";
const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const PCAPNG_MAGIC: &[u8] = &[0x0A, 0x0D, 0x0D, 0x0A];
const PCAP_MAGICS: [[u8; 4]; 4] = [
    [0xA1, 0xB2, 0xC3, 0xD4],
    [0xD4, 0xC3, 0xB2, 0xA1],
    [0xA1, 0xB2, 0x3C, 0x4D],
    [0x4D, 0x3C, 0xB2, 0xA1],
];
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const DOCX_MAIN_PART: &str = "word/document.xml";

/// Classifies `header` (the first bytes of the file at `path`).
///
/// Zip and gzip signatures need a second look at the file itself to tell
/// DOCX from plain zip and tar.gz from a bare gzip stream.
pub(crate) fn sniff(path: &Path, header: &[u8]) -> Sniff {
    if header.starts_with(EVTX_MAGIC) {
        return Sniff::Definite(Fingerprint::of(TypeTag::Evtx));
    }
    if header.len() >= 4 && PCAP_MAGICS.iter().any(|m| header[..4] == m[..]) {
        return Sniff::Definite(Fingerprint::of(TypeTag::Pcap));
    }
    if header.starts_with(PCAPNG_MAGIC) {
        return Sniff::Definite(Fingerprint::of(TypeTag::Pcapng));
    }
    if header.starts_with(PDF_MAGIC) {
        return Sniff::Definite(Fingerprint::of(TypeTag::Pdf));
    }
    if header.starts_with(ZIP_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
        let tag = if zip_has_member(path, DOCX_MAIN_PART) {
            TypeTag::Docx
        } else {
            TypeTag::Zip
        };
        return Sniff::Definite(Fingerprint::of(tag));
    }
    if header.starts_with(GZIP_MAGIC) {
        if gzip_wraps_tar(path) {
            return Sniff::Definite(Fingerprint {
                type_tag: TypeTag::Tar,
                mimetype: TypeTag::Gzip.mimetype().to_string(),
            });
        }
        return Sniff::Definite(Fingerprint::of(TypeTag::Gzip));
    }
    if has_tar_magic(header) {
        return Sniff::Definite(Fingerprint::of(TypeTag::Tar));
    }
    if looks_like_text(header) {
        return Sniff::Text;
    }
    Sniff::Inconclusive
}

/// Maps a file name to a tag by extension.
pub(crate) fn from_extension(path: &Path) -> Option<Fingerprint> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Some(Fingerprint {
            type_tag: TypeTag::Tar,
            mimetype: TypeTag::Gzip.mimetype().to_string(),
        });
    }

    let ext = name.rsplit_once('.')?.1;
    let tag = match ext {
        "evtx" => TypeTag::Evtx,
        "pcap" | "cap" => TypeTag::Pcap,
        "pcapng" => TypeTag::Pcapng,
        "csv" => TypeTag::Csv,
        "json" => TypeTag::Json,
        "xml" => TypeTag::Xml,
        "txt" | "log" => TypeTag::Txt,
        "pdf" => TypeTag::Pdf,
        "docx" => TypeTag::Docx,
        "zip" => TypeTag::Zip,
        "tar" => TypeTag::Tar,
        "gz" => TypeTag::Gzip,
        _ => return None,
    };
    Some(Fingerprint::of(tag))
}

/// Guesses a text format from its first non-blank character.
pub(crate) fn from_text_structure(header: &[u8]) -> Fingerprint {
    let body = header.strip_prefix(UTF8_BOM).unwrap_or(header);
    let first = body.iter().copied().find(|b| !b.is_ascii_whitespace());
    let tag = match first {
        Some(b'<') => TypeTag::Xml,
        Some(b'{') | Some(b'[') => TypeTag::Json,
        _ => TypeTag::Txt,
    };
    Fingerprint::of(tag)
}

fn has_tar_magic(bytes: &[u8]) -> bool {
    bytes.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &bytes[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
}

/// UTF-8 (a multi-byte sequence cut at the window edge is fine) without NULs.
fn looks_like_text(bytes: &[u8]) -> bool {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if body.contains(&0) {
        return false;
    }
    match std::str::from_utf8(body) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

fn zip_has_member(path: &Path, member: &str) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    match zip::ZipArchive::new(file) {
        Ok(mut archive) => archive.by_name(member).is_ok(),
        Err(_) => false,
    }
}

fn gzip_wraps_tar(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(512);
    match GzDecoder::new(file).take(512).read_to_end(&mut head) {
        Ok(_) => has_tar_magic(&head),
        Err(_) => false,
    }
}
