//! Listing and materializing archive entries (blocking).

use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::converter::error::ConverterError;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const FALLBACK_NAME: &str = "entry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ArchiveKind {
    Zip,
    /// Plain or gzip-compressed tar.
    Tar,
    /// Single-member gzip stream.
    Gzip,
}

/// Bounds applied while expanding one archive.
#[derive(Debug, Clone)]
pub(super) struct Limits {
    /// Depth the entries of this archive will have.
    pub child_depth: usize,
    pub max_depth: usize,
    pub max_entries: usize,
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
}

/// What happened to an entry during expansion.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Disposition {
    Directory,
    /// Written to this path, ready for dispatch.
    Materialized(PathBuf),
    /// Child depth would exceed the limit; never extracted.
    DepthExceeded,
    Skipped(String),
    /// The entry's data could not be extracted.
    Failed(String),
}

#[derive(Debug, Clone)]
pub(super) struct EntryRecord {
    pub name: String,
    pub size: u64,
    pub compressed_size: Option<u64>,
    pub is_directory: bool,
    pub mode: Option<u32>,
    pub mtime: Option<DateTime<Utc>>,
    pub disposition: Disposition,
}

#[derive(Debug)]
pub(super) struct Listing {
    pub archive_type: &'static str,
    pub entries: Vec<EntryRecord>,
    pub truncated: bool,
    pub entries_omitted: usize,
}

/// Lists every entry of the archive at `path`, materializing file entries
/// into `workdir` as long as the limits allow.
pub(super) fn extract(
    path: &Path,
    kind: ArchiveKind,
    limits: &Limits,
    workdir: &Path,
) -> Result<Listing, ConverterError> {
    let mut materializer = Materializer::new(workdir, limits);
    let mut listing = match kind {
        ArchiveKind::Zip => list_zip(path, &mut materializer)?,
        ArchiveKind::Tar => list_tar(path, &mut materializer)?,
        ArchiveKind::Gzip => list_gzip(path, &mut materializer)?,
    };
    listing.truncated |= materializer.limited;
    Ok(listing)
}

fn open(path: &Path) -> Result<BufReader<File>, ConverterError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ConverterError::unreadable(path, e))
}

fn list_zip(path: &Path, m: &mut Materializer<'_>) -> Result<Listing, ConverterError> {
    let mut archive = zip::ZipArchive::new(open(path)?)
        .map_err(|e| ConverterError::corrupt(format!("unreadable zip: {e}")))?;

    let total = archive.len();
    let mut listing = Listing::new("zip");

    for index in 0..total {
        if listing.entries.len() >= m.limits.max_entries {
            listing.truncated = true;
            listing.entries_omitted = total - index;
            break;
        }

        let (name, size, compressed_size, is_directory, mode, mtime) = {
            let raw = archive
                .by_index_raw(index)
                .map_err(|e| ConverterError::corrupt(format!("unreadable zip entry {index}: {e}")))?;
            (
                raw.name().to_string(),
                raw.size(),
                raw.compressed_size(),
                raw.is_dir(),
                raw.unix_mode(),
                zip_mtime(raw.last_modified()),
            )
        };

        let disposition = if is_directory {
            Disposition::Directory
        } else if m.depth_exceeded() {
            Disposition::DepthExceeded
        } else {
            match archive.by_index(index) {
                Ok(mut data) => m.place(&name, Some(size), &mut data).0,
                Err(e) => Disposition::Failed(format!("cannot read entry: {e}")),
            }
        };

        listing.entries.push(EntryRecord {
            name,
            size,
            compressed_size: Some(compressed_size),
            is_directory,
            mode,
            mtime,
            disposition,
        });
    }
    Ok(listing)
}

fn list_tar(path: &Path, m: &mut Materializer<'_>) -> Result<Listing, ConverterError> {
    let mut reader = open(path)?;
    let compressed = starts_with_gzip_magic(&mut reader).map_err(|e| ConverterError::unreadable(path, e))?;
    let stream: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(stream);
    let mut listing = Listing::new("tar");
    let entries = archive
        .entries()
        .map_err(|e| ConverterError::corrupt(format!("unreadable tar: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ConverterError::corrupt(format!("unreadable tar: {e}")))?;
        if listing.entries.len() >= m.limits.max_entries {
            listing.truncated = true;
            listing.entries_omitted += 1;
            continue;
        }

        let name = match entry.path() {
            Ok(p) => p.to_string_lossy().into_owned(),
            Err(_) => String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
        };
        let header = entry.header();
        let size = header.size().unwrap_or(0);
        let mode = header.mode().ok();
        let mtime = header
            .mtime()
            .ok()
            .and_then(|t| DateTime::<Utc>::from_timestamp(i64::try_from(t).ok()?, 0));
        let entry_type = header.entry_type();
        let is_directory = entry_type.is_dir();

        let disposition = if is_directory {
            Disposition::Directory
        } else if !entry_type.is_file() {
            Disposition::Skipped("not a regular file".to_string())
        } else if m.depth_exceeded() {
            Disposition::DepthExceeded
        } else {
            m.place(&name, Some(size), &mut entry).0
        };

        listing.entries.push(EntryRecord {
            name,
            size,
            compressed_size: None,
            is_directory,
            mode,
            mtime,
            disposition,
        });
    }
    Ok(listing)
}

fn list_gzip(path: &Path, m: &mut Materializer<'_>) -> Result<Listing, ConverterError> {
    let compressed_size = fs::metadata(path)
        .map_err(|e| ConverterError::unreadable(path, e))?
        .len();
    let mut decoder = GzDecoder::new(open(path)?);

    let (name, mtime) = match decoder.header() {
        Some(header) => (
            header
                .filename()
                .map(|n| String::from_utf8_lossy(n).into_owned()),
            match header.mtime() {
                0 => None,
                t => DateTime::<Utc>::from_timestamp(i64::from(t), 0),
            },
        ),
        None => (None, None),
    };
    let name = name.unwrap_or_else(|| inner_name(path));

    let mut listing = Listing::new("gzip");
    let (disposition, size) = if m.depth_exceeded() {
        (Disposition::DepthExceeded, 0)
    } else {
        m.place(&name, None, &mut decoder)
    };
    if let Disposition::Failed(reason) = &disposition {
        return Err(ConverterError::corrupt(format!("unreadable gzip: {reason}")));
    }

    listing.entries.push(EntryRecord {
        name,
        size,
        compressed_size: Some(compressed_size),
        is_directory: false,
        mode: None,
        mtime,
        disposition,
    });
    Ok(listing)
}

impl Listing {
    fn new(archive_type: &'static str) -> Self {
        Self {
            archive_type,
            entries: Vec::new(),
            truncated: false,
            entries_omitted: 0,
        }
    }
}

/// Writes entry data into numbered subdirectories of the work directory.
struct Materializer<'a> {
    workdir: &'a Path,
    limits: &'a Limits,
    written: u64,
    next_index: usize,
    /// Set once any entry was refused for size.
    limited: bool,
}

impl<'a> Materializer<'a> {
    fn new(workdir: &'a Path, limits: &'a Limits) -> Self {
        Self {
            workdir,
            limits,
            written: 0,
            next_index: 0,
            limited: false,
        }
    }

    fn depth_exceeded(&self) -> bool {
        self.limits.child_depth > self.limits.max_depth
    }

    /// Copies `reader` to disk. Returns the disposition and the bytes written.
    fn place<R: Read>(&mut self, name: &str, declared: Option<u64>, reader: &mut R) -> (Disposition, u64) {
        let remaining = self.limits.max_total_bytes.saturating_sub(self.written);
        if let Some(size) = declared {
            if size > self.limits.max_entry_bytes {
                return self.refuse(format!(
                    "entry exceeds max_entry_bytes ({})",
                    self.limits.max_entry_bytes
                ));
            }
            if size > remaining {
                return self.refuse(format!(
                    "archive exceeds max_archive_bytes ({})",
                    self.limits.max_total_bytes
                ));
            }
        }

        let budget = self.limits.max_entry_bytes.min(remaining);
        let dir = self.workdir.join(self.next_index.to_string());
        self.next_index += 1;
        let target = dir.join(safe_file_name(name));

        let copied = fs::create_dir_all(&dir)
            .and_then(|()| File::create(&target))
            .and_then(|mut file| io::copy(&mut reader.take(budget + 1), &mut file));

        match copied {
            Ok(n) if n > budget => {
                let _ = fs::remove_file(&target);
                self.refuse(format!("entry exceeds its byte budget ({budget})"))
            }
            Ok(n) => {
                self.written += n;
                (Disposition::Materialized(target), n)
            }
            Err(e) => {
                let _ = fs::remove_file(&target);
                (Disposition::Failed(format!("cannot extract entry: {e}")), 0)
            }
        }
    }

    fn refuse(&mut self, reason: String) -> (Disposition, u64) {
        self.limited = true;
        (Disposition::Skipped(reason), 0)
    }
}

/// Last path component of an entry name, safe to create inside a directory.
fn safe_file_name(entry_name: &str) -> String {
    let last = entry_name
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    match last {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Name of the member of a bare gzip file, from its own file name.
fn inner_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = file_name.to_ascii_lowercase();
    let stem = if lower.ends_with(".gz") {
        &file_name[..file_name.len() - 3]
    } else if lower.ends_with(".gzip") {
        &file_name[..file_name.len() - 5]
    } else {
        file_name.as_str()
    };
    if stem.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        stem.to_string()
    }
}

fn starts_with_gzip_magic(reader: &mut BufReader<File>) -> io::Result<bool> {
    use std::io::BufRead;
    let buf = reader.fill_buf()?;
    Ok(buf.starts_with(&GZIP_MAGIC))
}

fn zip_mtime(dt: zip::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(i32::from(dt.year()), u32::from(dt.month()), u32::from(dt.day()))?
        .and_hms_opt(
            u32::from(dt.hour()),
            u32::from(dt.minute()),
            u32::from(dt.second()),
        )
        .map(|naive| naive.and_utc())
}
