//! Change detection over a mirrored tree.
//!
//! [`scan`] walks every regular file under the mirror root (or a
//! subdirectory of it), reads it, and yields a [`FileRecord`] carrying its
//! SHA-256 fingerprint. The walk is lazy: nothing is read until the
//! iterator is advanced, and each call to `scan` starts a fresh walk.
//!
//! A file that cannot be read yields an `Err` for that entry only. The
//! iterator keeps going, so one bad file never hides the rest of the tree.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{SyncError, SyncErrorKind, SyncResult};
use crate::models::FileRecord;

/// Include/exclude globs, matched against the path relative to the mirror
/// root. `**/.git/**` is always excluded.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl ScanFilter {
    pub fn new(include_globs: &[String], exclude_globs: &[String]) -> Result<Self> {
        let mut excludes = vec!["**/.git/**".to_string(), ".git/**".to_string()];
        excludes.extend(exclude_globs.iter().cloned());
        Ok(Self {
            include: build_globset(include_globs)?,
            exclude: build_globset(&excludes)?,
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::new(&config.include_globs, &config.exclude_globs)
    }

    /// Accept every file outside `.git`.
    pub fn all() -> Result<Self> {
        Self::new(&["**/*".to_string()], &[])
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        !self.exclude.is_match(relative_path) && self.include.is_match(relative_path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Lazy, one-shot walk produced by [`scan`].
pub struct Scan {
    root: PathBuf,
    walker: Option<walkdir::IntoIter>,
    filter: ScanFilter,
}

/// Walk `root/path_filter` (or `root` when the filter is empty).
///
/// Relative paths in the yielded records are relative to `root`, not to
/// the filtered subdirectory. A filter naming a directory that does not
/// exist produces an empty scan.
pub fn scan(root: &Path, path_filter: &str, filter: &ScanFilter) -> Scan {
    let path_filter = path_filter.trim_matches('/');
    let scan_root = if path_filter.is_empty() {
        root.to_path_buf()
    } else {
        root.join(path_filter)
    };

    let walker = if scan_root.is_dir() {
        Some(WalkDir::new(&scan_root).into_iter())
    } else {
        warn!(path = %scan_root.display(), "scan root does not exist, nothing to scan");
        None
    };

    Scan {
        root: root.to_path_buf(),
        walker,
        filter: filter.clone(),
    }
}

impl Iterator for Scan {
    type Item = SyncResult<FileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let walker = self.walker.as_mut()?;
        loop {
            let entry = match walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| relative_path(&self.root, p))
                        .unwrap_or_default();
                    return Some(Err(SyncError::at_path(
                        SyncErrorKind::FileReadFailed,
                        Path::new(&path),
                        e.to_string(),
                    )));
                }
            };

            if entry.file_type().is_dir() {
                if entry.file_name() == ".git" {
                    walker.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_path(&self.root, entry.path());
            if !self.filter.matches(&rel) {
                continue;
            }

            return Some(match std::fs::read(entry.path()) {
                Ok(bytes) => Ok(FileRecord::new(rel, bytes)),
                Err(e) => Err(SyncError::at_path(
                    SyncErrorKind::FileReadFailed,
                    Path::new(&rel),
                    e.to_string(),
                )),
            });
        }
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
