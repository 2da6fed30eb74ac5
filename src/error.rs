//! Error taxonomy for mirror, scan, and write-back operations.
//!
//! Every fallible operation in the library returns [`SyncError`]. The
//! [`SyncErrorKind`] tells the caller what failed; only
//! [`SyncErrorKind::FileReadFailed`] is recoverable (the ingestion pipeline
//! skips the file and keeps going). Everything else is meant to bubble up
//! unchanged to whoever started the run.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    /// Every clone attempt failed.
    CloneExhausted,
    /// Fetching or fast-forwarding an existing mirror failed.
    PullFailed,
    /// The requested branch exists neither locally nor on the remote.
    BranchNotFound,
    /// A file listed during a scan could not be read.
    FileReadFailed,
    /// The remote refused a push (non-fast-forward, authentication).
    PushRejected,
    /// A branch with the requested name already exists.
    BranchCreateFailed,
    /// The hosting API refused to open the pull request.
    PullRequestRejected,
    /// An edit path escapes the mirror or targets `.git`.
    InvalidPath,
    /// Writing an edit into the mirror failed.
    WriteFailed,
    /// `git commit` refused to record the staged edits.
    CommitFailed,
    /// The knowledge sink failed a lookup or an upsert.
    SinkFailed,
    /// Any other git invocation failure.
    Git,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::CloneExhausted => "clone exhausted",
            SyncErrorKind::PullFailed => "pull failed",
            SyncErrorKind::BranchNotFound => "branch not found",
            SyncErrorKind::FileReadFailed => "file read failed",
            SyncErrorKind::PushRejected => "push rejected",
            SyncErrorKind::BranchCreateFailed => "branch create failed",
            SyncErrorKind::PullRequestRejected => "pull request rejected",
            SyncErrorKind::InvalidPath => "invalid path",
            SyncErrorKind::WriteFailed => "write failed",
            SyncErrorKind::CommitFailed => "commit failed",
            SyncErrorKind::SinkFailed => "knowledge sink failed",
            SyncErrorKind::Git => "git failed",
        }
    }

    /// Only unreadable files are skipped; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncErrorKind::FileReadFailed)
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by the sync engine.
#[derive(Debug, Error)]
#[error("{reason}{}: {detail}", path_suffix(.path))]
pub struct SyncError {
    pub reason: SyncErrorKind,
    pub path: Option<PathBuf>,
    pub detail: String,
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" ({})", p.display()),
        None => String::new(),
    }
}

impl SyncError {
    pub fn new(reason: SyncErrorKind, detail: impl Into<String>) -> Self {
        Self {
            reason,
            path: None,
            detail: detail.into(),
        }
    }

    pub fn at_path(reason: SyncErrorKind, path: &Path, detail: impl Into<String>) -> Self {
        Self {
            reason,
            path: Some(path.to_path_buf()),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> SyncErrorKind {
        self.reason
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
