//! Write-back: push edits to the remote, directly or through a pull request.
//!
//! Both entry points write the edits into the mirror (overwriting whatever
//! is there), stage exactly those paths, and record a single commit.
//! [`commit_and_push`] then pushes to the checked-out branch;
//! [`open_pull_request`] does the same on a fresh branch and asks the
//! hosting API to open a pull request against the mirror's base branch.
//!
//! Failures are not rolled back, except that a pull request whose edits
//! change nothing drops its new branch again. If the push is rejected the
//! commit stays in the local mirror, unpushed, and the next sync's
//! fast-forward will refuse to run until someone resets or pushes it.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{SyncError, SyncErrorKind, SyncResult};
use crate::github::{NewPullRequest, PullRequestApi, PullRequestResult};
use crate::mirror::RepositoryMirror;

/// Overwrite `path` (relative to the repository root) with `content`.
#[derive(Debug, Clone)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

impl FileEdit {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitSpec {
    pub message: String,
    pub edits: Vec<FileEdit>,
}

#[derive(Debug, Clone)]
pub struct PullRequestSpec {
    pub title: String,
    /// New branch that will carry the commit.
    pub branch: String,
    pub description: Option<String>,
    pub edits: Vec<FileEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub sha: String,
    pub branch: String,
}

/// Commit the edits on the current branch and push it.
///
/// # Errors
///
/// - [`SyncErrorKind::InvalidPath`] before anything is written, if any edit
///   path leaves the repository or touches `.git`.
/// - [`SyncErrorKind::WriteFailed`] / [`SyncErrorKind::CommitFailed`] while
///   recording the commit.
/// - [`SyncErrorKind::PushRejected`] if the remote refuses the push. The
///   commit remains in the mirror.
pub fn commit_and_push(mirror: &RepositoryMirror, spec: &CommitSpec) -> SyncResult<CommitResult> {
    let paths = validate_edits(&spec.message, &spec.edits)?;
    let branch = mirror.current_branch()?.ok_or_else(|| {
        SyncError::new(
            SyncErrorKind::PushRejected,
            "mirror is on a detached HEAD; there is no branch to push to",
        )
    })?;

    write_and_stage(mirror, &spec.edits, &paths)?;
    let sha = mirror.commit(&spec.message)?;
    mirror.push(&branch, false)?;

    info!(sha = %sha, branch = %branch, files = paths.len(), "changes pushed");
    Ok(CommitResult { sha, branch })
}

/// Commit the edits on a new branch, push it, and open a pull request
/// against the mirror's base branch.
///
/// Once the branch has been pushed the mirror switches back to the base
/// branch, whether or not the pull request was accepted. Edits identical to
/// the base produce no commit: the new branch is dropped again and the
/// request is rejected without contacting the API.
///
/// # Errors
///
/// - [`SyncErrorKind::BranchCreateFailed`] if `spec.branch` already exists.
/// - [`SyncErrorKind::PushRejected`] if the new branch cannot be pushed.
/// - [`SyncErrorKind::PullRequestRejected`] if the edits change nothing or
///   the hosting API refuses.
pub async fn open_pull_request(
    mirror: &RepositoryMirror,
    api: &dyn PullRequestApi,
    spec: &PullRequestSpec,
) -> SyncResult<PullRequestResult> {
    let paths = validate_edits(&spec.title, &spec.edits)?;
    let base = mirror.base_branch().to_string();

    mirror.create_branch(&spec.branch)?;
    write_and_stage(mirror, &spec.edits, &paths)?;
    if !mirror.has_staged_changes()? {
        abandon_branch(mirror, &base, &spec.branch);
        return Err(SyncError::new(
            SyncErrorKind::PullRequestRejected,
            format!("no diff between {} and {}", spec.branch, base),
        ));
    }
    let sha = mirror.commit(&spec.title)?;
    mirror.push(&spec.branch, true)?;
    info!(sha = %sha, branch = %spec.branch, "pull request branch pushed");

    let request = NewPullRequest {
        title: spec.title.clone(),
        body: spec.description.clone().unwrap_or_default(),
        head: spec.branch.clone(),
        base: base.clone(),
    };
    let result = api.create_pull_request(&request).await;

    if let Err(e) = mirror.checkout(&base) {
        warn!(branch = %base, error = %e, "could not switch mirror back to base branch");
    }

    result
}

fn validate_edits(message: &str, edits: &[FileEdit]) -> SyncResult<Vec<String>> {
    if message.trim().is_empty() {
        return Err(SyncError::new(
            SyncErrorKind::CommitFailed,
            "commit message must not be empty",
        ));
    }
    if edits.is_empty() {
        return Err(SyncError::new(SyncErrorKind::CommitFailed, "no edits to commit"));
    }
    edits.iter().map(|e| normalize_edit_path(&e.path)).collect()
}

fn write_and_stage(
    mirror: &RepositoryMirror,
    edits: &[FileEdit],
    paths: &[String],
) -> SyncResult<()> {
    let root = mirror.local_path();
    for (edit, rel) in edits.iter().zip(paths) {
        write_edit(root, rel, &edit.content)?;
    }

    let staged: Vec<&str> = paths.iter().map(String::as_str).collect();
    mirror.stage(&staged)
}

/// Return to `base` and delete the unused local `branch`.
fn abandon_branch(mirror: &RepositoryMirror, base: &str, branch: &str) {
    if let Err(e) = mirror.checkout(base) {
        warn!(branch = %base, error = %e, "could not switch mirror back to base branch");
        return;
    }
    if let Err(e) = mirror.delete_branch(branch) {
        warn!(branch = %branch, error = %e, "could not delete unused branch");
    }
}

fn write_edit(root: &Path, rel: &str, content: &str) -> SyncResult<()> {
    let target = root.join(rel);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SyncError::at_path(SyncErrorKind::WriteFailed, Path::new(rel), e.to_string())
        })?;
    }
    std::fs::write(&target, content).map_err(|e| {
        SyncError::at_path(SyncErrorKind::WriteFailed, Path::new(rel), e.to_string())
    })
}

/// Normalize an edit path to `a/b/c` form, rejecting anything that would
/// land outside the working tree or inside `.git`.
fn normalize_edit_path(path: &str) -> SyncResult<String> {
    let invalid = |why: &str| {
        SyncError::at_path(SyncErrorKind::InvalidPath, Path::new(path), why.to_string())
    };

    if path.starts_with('/') || path.contains('\\') || Path::new(path).is_absolute() {
        return Err(invalid("edit paths must be relative with '/' separators"));
    }

    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid("edit paths must not contain '..'")),
            ".git" => return Err(invalid("edit paths must not touch .git")),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(invalid("edit path is empty"));
    }
    Ok(parts.join("/"))
}
