//! Input enumeration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// A top-level input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Where the file is read from.
    pub path: PathBuf,
    /// Path below the input root, used to name the output.
    pub relative: PathBuf,
}

/// Lists the files to convert under `input`.
///
/// A file input yields itself. A directory is walked without following
/// links; a symlink is kept only when its target is a regular file inside
/// the root, and every canonical file is listed once, preferring the real
/// path over links to it. `exclude` (the output directory) is not entered.
pub fn discover(input: &Path, exclude: Option<&Path>) -> Vec<DiscoveredFile> {
    if !input.is_dir() {
        let relative = input
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| input.to_path_buf());
        return vec![DiscoveredFile {
            path: input.to_path_buf(),
            relative,
        }];
    }

    let root = canonical(input);
    let exclude = exclude.map(canonical);

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut links = Vec::new();

    let walker = WalkDir::new(input)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && exclude
                    .as_deref()
                    .is_some_and(|excluded| canonical(entry.path()) == excluded))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_file() {
            if seen.insert(canonical(entry.path())) {
                files.push(entry.into_path());
            }
        } else if file_type.is_symlink() {
            links.push(entry.into_path());
        }
    }

    for link in links {
        let Ok(target) = link.canonicalize() else {
            debug!(path = %link.display(), "Skipping dangling symlink");
            continue;
        };
        let inside = target.starts_with(&root)
            && !exclude.as_deref().is_some_and(|excluded| target.starts_with(excluded));
        if !inside || !target.is_file() {
            debug!(path = %link.display(), target = %target.display(), "Skipping symlink");
            continue;
        }
        if seen.insert(target) {
            files.push(link);
        }
    }

    files.sort();
    files
        .into_iter()
        .map(|path| {
            let relative = path.strip_prefix(input).map(Path::to_path_buf).unwrap_or_else(|_| {
                path.file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| path.clone())
            });
            DiscoveredFile { path, relative }
        })
        .collect()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::write_file;
    use tempfile::TempDir;

    fn relatives(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_single_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.csv", b"x");
        let files = discover(&path, None);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("a.csv"));
    }

    #[test]
    fn test_walks_nested_directories() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "b.txt", b"x");
        write_file(dir.path(), "logs/a.csv", b"x");
        write_file(dir.path(), "logs/deep/c.json", b"{}");

        let files = discover(dir.path(), None);
        assert_eq!(relatives(&files), ["b.txt", "logs/a.csv", "logs/deep/c.json"]);
    }

    #[test]
    fn test_excludes_output_directory() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.txt", b"x");
        write_file(dir.path(), "out/a.txt.json", b"{}");

        let files = discover(dir.path(), Some(&dir.path().join("out")));
        assert_eq!(relatives(&files), ["a.txt"]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path(), None).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let real = write_file(dir.path(), "real.txt", b"x");
        let foreign = write_file(outside.path(), "foreign.txt", b"x");
        let lonely = write_file(dir.path(), "sub/lonely.txt", b"x");
        std::fs::remove_file(&lonely).unwrap();
        let target = write_file(outside.path(), "unused.txt", b"x");

        // alias of a real file, two links out of the root, a dangling link
        // and a linked directory: only the real file survives
        std::os::unix::fs::symlink(&real, dir.path().join("alias.txt")).unwrap();
        std::os::unix::fs::symlink(&foreign, dir.path().join("escape.txt")).unwrap();
        std::os::unix::fs::symlink(&lonely, dir.path().join("dangling.txt")).unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("sub/outside.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked_dir")).unwrap();

        let files = discover(dir.path(), None);
        assert_eq!(relatives(&files), ["real.txt"]);
    }
}
