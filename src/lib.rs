//! # repo-sync
//!
//! Mirror a GitHub repository locally, publish the files that changed into a
//! knowledge store, and write edits back as commits or pull requests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────┐   ┌───────────────┐
//! │  Config  │──▶│    Mirror     │──▶│  Scan   │──▶│ KnowledgeSink │
//! │  (TOML)  │   │ clone / pull  │   │ SHA-256 │   │ Memory/SQLite │
//! └──────────┘   └──────┬───────┘   └─────────┘   └───────────────┘
//!                       │
//!                       ▼
//!                ┌──────────────┐   ┌──────────────┐
//!                │  Write-back  │──▶│  GitHub API  │
//!                │ commit/push  │   │ pull request │
//!                └──────────────┘   └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. [`mirror::RepositoryMirror::ensure_ready`] clones the repository (up to
//!    three attempts) or fast-forwards an existing mirror, then checks out
//!    the configured branch.
//! 2. [`scan::scan`] lazily walks the mirror under the configured path and
//!    fingerprints each file.
//! 3. [`ingest::run_sync`] derives a [`models::KnowledgeId`] per file, asks
//!    the [`sink::KnowledgeSink`] what it already holds, and upserts only
//!    files whose fingerprint changed.
//! 4. [`writeback`] commits edits into the same mirror and pushes them, or
//!    opens a pull request through [`github::PullRequestApi`].
//!
//! ## Quick Start
//!
//! ```bash
//! repo-sync init                                   # create knowledge database
//! repo-sync sync                                   # mirror + publish changes
//! repo-sync sync --dry-run                         # show what would change
//! repo-sync commit -m "Fix typo" --file guides/a.md=./a.md
//! repo-sync pr --title "Update docs" --branch auto/update-1 --file guides/a.md=./a.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | `SyncError` taxonomy |
//! | [`git`] | `git` command runner behind the `GitBackend` trait |
//! | [`mirror`] | Local clone lifecycle: clone-with-retry, pull, checkout, push |
//! | [`scan`] | Lazy file walk with content fingerprints |
//! | [`models`] | File records, knowledge identifiers and records |
//! | [`sink`] | `KnowledgeSink` trait, in-memory and SQLite sinks |
//! | [`ingest`] | Sync pipeline: ensure ready, scan, decide, upsert |
//! | [`github`] | GitHub REST client for pull requests |
//! | [`writeback`] | Commit-and-push and pull request workflows |

pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod ingest;
pub mod mirror;
pub mod models;
pub mod scan;
pub mod sink;
pub mod writeback;
