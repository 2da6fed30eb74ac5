//! Local mirror of the remote repository.
//!
//! A [`RepositoryMirror`] owns one working copy at
//! `{mirror.base_dir}/{owner}/{repo}`. [`ensure_ready`](RepositoryMirror::ensure_ready)
//! clones it on first use and fast-forwards it afterwards; the write-back
//! coordinator uses the same mirror to commit and push.
//!
//! There is no locking here. Callers must make sure only one operation
//! touches a given mirror path at a time.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SyncError, SyncErrorKind, SyncResult};
use crate::git::{CliGit, GitBackend, GitOutput};

/// Where the mirror lives and what it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorHandle {
    pub local_path: PathBuf,
    pub remote_url: String,
}

impl MirrorHandle {
    pub fn from_config(config: &Config) -> Self {
        let gh = &config.github;
        let remote_url = gh
            .remote_url
            .clone()
            .unwrap_or_else(|| github_remote_url(&gh.owner, &gh.repo));
        Self {
            local_path: mirror_path(&config.mirror.base_dir, &gh.owner, &gh.repo),
            remote_url,
        }
    }
}

/// `https://github.com/{owner}/{repo}.git`
pub fn github_remote_url(owner: &str, repo: &str) -> String {
    format!("https://github.com/{}/{}.git", owner, repo)
}

/// Deterministic mirror location for an (owner, repo) pair.
pub fn mirror_path(base_dir: &Path, owner: &str, repo: &str) -> PathBuf {
    base_dir.join(owner).join(repo)
}

/// What [`RepositoryMirror::ensure_ready`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A fresh clone, after this many attempts.
    Cloned { attempts: u32 },
    /// An existing mirror was fast-forwarded.
    Updated,
}

/// Commit identity used for write-back commits.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub email: String,
}

pub struct RepositoryMirror {
    handle: MirrorHandle,
    base_dir: PathBuf,
    branch: String,
    clone_attempts: u32,
    author: Author,
    git: Arc<dyn GitBackend>,
}

impl RepositoryMirror {
    /// A mirror that talks to the remote through the system `git`.
    pub fn new(config: &Config) -> Self {
        let handle = MirrorHandle::from_config(config);
        let git = CliGit::new(config.credential(), &handle.remote_url);
        Self::with_backend(config, Arc::new(git))
    }

    pub fn with_backend(config: &Config, git: Arc<dyn GitBackend>) -> Self {
        Self {
            handle: MirrorHandle::from_config(config),
            base_dir: config.mirror.base_dir.clone(),
            branch: config.github.branch.clone(),
            clone_attempts: config.mirror.clone_attempts,
            author: Author {
                name: config.mirror.author_name.clone(),
                email: config.mirror.author_email.clone(),
            },
            git,
        }
    }

    pub fn handle(&self) -> &MirrorHandle {
        &self.handle
    }

    pub fn local_path(&self) -> &Path {
        &self.handle.local_path
    }

    /// The configured branch this mirror tracks and pull requests target.
    pub fn base_branch(&self) -> &str {
        &self.branch
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn is_cloned(&self) -> bool {
        self.handle.local_path.join(".git").exists()
    }

    /// Clone or fetch, switch to the configured branch, and fast-forward it.
    ///
    /// # Errors
    ///
    /// - [`SyncErrorKind::InvalidPath`] when the mirror path would leave the
    ///   configured base directory. Nothing on disk is touched.
    /// - [`SyncErrorKind::CloneExhausted`] when every clone attempt failed.
    /// - [`SyncErrorKind::PullFailed`] when an existing mirror cannot be
    ///   fetched or its branch fast-forwarded. Not retried.
    /// - [`SyncErrorKind::BranchNotFound`] when the configured branch does
    ///   not exist.
    pub fn ensure_ready(&self) -> SyncResult<Readiness> {
        self.check_location()?;

        if let Some(parent) = self.handle.local_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    path = %parent.display(),
                    error = %e,
                    "could not create mirror parent directory"
                );
            }
        }

        let readiness = if self.is_cloned() {
            self.fetch()?;
            Readiness::Updated
        } else {
            let attempts = self.clone_with_retry()?;
            Readiness::Cloned { attempts }
        };

        let current = self.current_branch()?;
        if !self.branch.is_empty() && current.as_deref() != Some(self.branch.as_str()) {
            self.checkout(&self.branch)?;
        }

        if readiness == Readiness::Updated {
            self.fast_forward()?;
        }

        Ok(readiness)
    }

    /// The mirror must sit exactly two plain components below `base_dir`.
    fn check_location(&self) -> SyncResult<()> {
        let local = &self.handle.local_path;
        let contained = local
            .strip_prefix(&self.base_dir)
            .map(|rel| {
                let parts: Vec<_> = rel.components().collect();
                parts.len() == 2 && parts.iter().all(|c| matches!(c, Component::Normal(_)))
            })
            .unwrap_or(false);
        if contained {
            Ok(())
        } else {
            Err(SyncError::at_path(
                SyncErrorKind::InvalidPath,
                local,
                format!("mirror path escapes {}", self.base_dir.display()),
            ))
        }
    }

    fn clone_with_retry(&self) -> SyncResult<u32> {
        let dest = &self.handle.local_path;
        let mut last_error = String::new();

        for attempt in 1..=self.clone_attempts {
            remove_partial_clone(dest);
            info!(remote = %self.handle.remote_url, attempt, "cloning repository");

            match self.git.clone_repo(&self.handle.remote_url, dest) {
                Ok(out) if out.success => {
                    info!(path = %dest.display(), attempt, "clone complete");
                    return Ok(attempt);
                }
                Ok(out) => last_error = out.message(),
                Err(e) => last_error = format!("failed to execute git clone: {}", e),
            }
            warn!(
                attempt,
                max = self.clone_attempts,
                error = %last_error,
                "clone attempt failed"
            );
        }

        remove_partial_clone(dest);
        Err(SyncError::new(
            SyncErrorKind::CloneExhausted,
            format!(
                "{} clone attempt(s) of {} failed; last error: {}",
                self.clone_attempts, self.handle.remote_url, last_error
            ),
        ))
    }

    fn fetch(&self) -> SyncResult<()> {
        info!(path = %self.handle.local_path.display(), "updating mirror");
        self.git_ok(&["fetch", "--prune", "origin"], true, SyncErrorKind::PullFailed)?;
        Ok(())
    }

    /// Fast-forward the checked-out branch to its `origin` counterpart.
    fn fast_forward(&self) -> SyncResult<()> {
        let Some(current) = self.current_branch()? else {
            debug!("detached HEAD, nothing to fast-forward");
            return Ok(());
        };
        let upstream = format!("origin/{}", current);
        if !self.ref_exists(&format!("refs/remotes/{}", upstream))? {
            debug!(branch = %current, "branch has no remote counterpart");
            return Ok(());
        }
        self.git_ok(
            &["merge", "--ff-only", &upstream],
            false,
            SyncErrorKind::PullFailed,
        )?;
        debug!(branch = %current, "fast-forwarded");
        Ok(())
    }

    /// The checked-out branch, or `None` on a detached HEAD.
    pub fn current_branch(&self) -> SyncResult<Option<String>> {
        let out = self.git_raw(
            &["symbolic-ref", "--short", "-q", "HEAD"],
            false,
            SyncErrorKind::Git,
        )?;
        if out.success {
            Ok(Some(out.value()))
        } else {
            Ok(None)
        }
    }

    pub fn head_sha(&self) -> SyncResult<String> {
        Ok(self
            .git_ok(&["rev-parse", "HEAD"], false, SyncErrorKind::Git)?
            .value())
    }

    /// Switch to `branch`, creating a tracking branch from `origin/{branch}`
    /// when only the remote one exists.
    pub fn checkout(&self, branch: &str) -> SyncResult<()> {
        if self.ref_exists(&format!("refs/heads/{}", branch))? {
            self.git_ok(&["checkout", branch, "--"], false, SyncErrorKind::Git)?;
        } else if self.ref_exists(&format!("refs/remotes/origin/{}", branch))? {
            let upstream = format!("origin/{}", branch);
            self.git_ok(
                &["checkout", "-b", branch, "--track", &upstream],
                false,
                SyncErrorKind::Git,
            )?;
        } else {
            return Err(SyncError::new(
                SyncErrorKind::BranchNotFound,
                format!("branch '{}' does not exist locally or on origin", branch),
            ));
        }
        info!(branch, "checked out");
        Ok(())
    }

    /// Create `name` from the current HEAD and switch to it.
    ///
    /// Fails with [`SyncErrorKind::BranchCreateFailed`] if the name is not a
    /// valid branch name or is already taken locally or on origin.
    pub fn create_branch(&self, name: &str) -> SyncResult<()> {
        let kind = SyncErrorKind::BranchCreateFailed;
        let valid = self.git_raw(&["check-ref-format", "--branch", name], false, kind)?;
        if !valid.success {
            return Err(SyncError::new(
                kind,
                format!("'{}' is not a valid branch name", name),
            ));
        }
        if self.ref_exists(&format!("refs/heads/{}", name))? {
            return Err(SyncError::new(
                kind,
                format!("branch '{}' already exists locally", name),
            ));
        }

        let remote_ref = format!("refs/heads/{}", name);
        let remote = self.git_ok(&["ls-remote", "--heads", "origin", &remote_ref], true, kind)?;
        if !remote.value().is_empty() {
            return Err(SyncError::new(
                kind,
                format!("branch '{}' already exists on origin", name),
            ));
        }

        self.git_ok(&["checkout", "-b", name], false, kind)?;
        info!(branch = name, "created branch");
        Ok(())
    }

    /// Force-delete a local branch. Must not be the checked-out one.
    pub fn delete_branch(&self, name: &str) -> SyncResult<()> {
        self.git_ok(&["branch", "-D", name], false, SyncErrorKind::Git)?;
        debug!(branch = name, "deleted local branch");
        Ok(())
    }

    /// Whether the index differs from HEAD.
    pub fn has_staged_changes(&self) -> SyncResult<bool> {
        let out = self.git_raw(
            &["diff", "--cached", "--quiet", "--exit-code"],
            false,
            SyncErrorKind::CommitFailed,
        )?;
        Ok(!out.success)
    }

    /// Stage exactly the given paths (relative to the mirror root).
    pub fn stage(&self, paths: &[&str]) -> SyncResult<()> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.git_ok(&args, false, SyncErrorKind::CommitFailed)?;
        Ok(())
    }

    /// Record the staged changes as one commit and return its SHA.
    pub fn commit(&self, message: &str) -> SyncResult<String> {
        let name = format!("user.name={}", self.author.name);
        let email = format!("user.email={}", self.author.email);
        self.git_ok(
            &[
                "-c", &name, "-c", &email, "-c", "commit.gpgsign=false", "commit", "--no-verify",
                "-m", message,
            ],
            false,
            SyncErrorKind::CommitFailed,
        )?;
        self.head_sha()
    }

    /// Push HEAD to `branch` on origin.
    pub fn push(&self, branch: &str, set_upstream: bool) -> SyncResult<()> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        let mut args = vec!["push"];
        if set_upstream {
            args.push("--set-upstream");
        }
        args.extend_from_slice(&["origin", &refspec]);
        self.git_ok(&args, true, SyncErrorKind::PushRejected)?;
        info!(branch, "pushed");
        Ok(())
    }

    fn ref_exists(&self, reference: &str) -> SyncResult<bool> {
        Ok(self
            .git_raw(
                &["rev-parse", "--verify", "--quiet", reference],
                false,
                SyncErrorKind::Git,
            )?
            .success)
    }

    /// Run git in the mirror; only a failure to start git is an error.
    fn git_raw(&self, args: &[&str], network: bool, kind: SyncErrorKind) -> SyncResult<GitOutput> {
        debug!(args = ?args, "git");
        self.git
            .run(&self.handle.local_path, args, network)
            .map_err(|e| SyncError::new(kind, format!("failed to execute git: {}", e)))
    }

    /// Run git in the mirror and turn a non-zero exit into `kind`.
    fn git_ok(&self, args: &[&str], network: bool, kind: SyncErrorKind) -> SyncResult<GitOutput> {
        let out = self.git_raw(args, network, kind)?;
        if !out.success {
            let sub = args
                .iter()
                .find(|a| !a.starts_with('-') && !a.contains('='))
                .unwrap_or(&"");
            return Err(SyncError::new(
                kind,
                format!("git {} failed: {}", sub, out.message()),
            ));
        }
        Ok(out)
    }
}

fn remove_partial_clone(dest: &Path) {
    if dest.exists() {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            warn!(path = %dest.display(), error = %e, "could not remove partial clone");
        }
    }
}
