//! # repo-sync CLI
//!
//! ## Usage
//!
//! ```bash
//! repo-sync --config ./config/repo-sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-sync init` | Create the knowledge database |
//! | `repo-sync sync` | Mirror the repository and publish changed files |
//! | `repo-sync commit` | Commit local files into the repository and push |
//! | `repo-sync pr` | Push local files on a new branch and open a pull request |
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_sync::config::{self, Config};
use repo_sync::github::GithubClient;
use repo_sync::ingest::{self, SyncOptions, SyncReport};
use repo_sync::mirror::{Readiness, RepositoryMirror};
use repo_sync::sink::SqliteSink;
use repo_sync::writeback::{self, CommitSpec, FileEdit, PullRequestSpec};

/// Mirror a GitHub repository, publish changed files into a knowledge
/// store, and write edits back.
#[derive(Parser)]
#[command(name = "repo-sync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repo-sync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the knowledge database. Safe to run more than once.
    Init,

    /// Clone or update the mirror, then upsert every changed file.
    Sync {
        /// Show what would be upserted without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Commit files on the current branch and push.
    Commit {
        /// Commit message.
        #[arg(long, short)]
        message: String,

        /// Edits as `<repo path>=<local file>` pairs.
        #[arg(long = "file", value_parser = parse_key_val, required = true)]
        files: Vec<(String, String)>,
    },

    /// Commit files on a new branch and open a pull request.
    Pr {
        /// Pull request title, also used as the commit message.
        #[arg(long)]
        title: String,

        /// Name of the branch to create.
        #[arg(long)]
        branch: String,

        /// Pull request description.
        #[arg(long)]
        body: Option<String>,

        /// Edits as `<repo path>=<local file>` pairs.
        #[arg(long = "file", value_parser = parse_key_val, required = true)]
        files: Vec<(String, String)>,
    },
}

/// Parse a `key=value` pair for `--file` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid PATH=FILE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn load_edits(files: &[(String, String)]) -> Result<Vec<FileEdit>> {
    files
        .iter()
        .map(|(repo_path, local)| {
            let content = std::fs::read_to_string(local)
                .with_context(|| format!("Failed to read {}", local))?;
            Ok(FileEdit::new(repo_path.clone(), content))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let sink = SqliteSink::open(&cfg.store.path).await?;
            sink.close().await;
            println!("Knowledge database initialized at {}", cfg.store.path.display());
        }
        Commands::Sync { dry_run } => {
            run_sync(&cfg, dry_run).await?;
        }
        Commands::Commit { message, files } => {
            let mirror = RepositoryMirror::new(&cfg);
            mirror.ensure_ready()?;
            let spec = CommitSpec {
                message,
                edits: load_edits(&files)?,
            };
            let result = writeback::commit_and_push(&mirror, &spec)?;
            println!("committed {} to {}", result.sha, result.branch);
        }
        Commands::Pr {
            title,
            branch,
            body,
            files,
        } => {
            let mirror = RepositoryMirror::new(&cfg);
            mirror.ensure_ready()?;
            let api = GithubClient::from_config(&cfg)?;
            let spec = PullRequestSpec {
                title,
                branch,
                description: body,
                edits: load_edits(&files)?,
            };
            let result = writeback::open_pull_request(&mirror, &api, &spec).await?;
            println!("pull request #{}: {}", result.number, result.url);
        }
    }

    Ok(())
}

async fn run_sync(cfg: &Config, dry_run: bool) -> Result<()> {
    let sink = SqliteSink::open(&cfg.store.path).await?;
    let mirror = RepositoryMirror::new(cfg);

    let report = ingest::run_sync(cfg, &mirror, &sink, SyncOptions { dry_run }).await?;
    print_report(cfg, &report, dry_run);

    sink.close().await;
    Ok(())
}

fn print_report(cfg: &Config, report: &SyncReport, dry_run: bool) {
    let label = format!("{}/{}", cfg.github.owner, cfg.github.repo);
    if dry_run {
        println!("sync {} (dry-run)", label);
    } else {
        println!("sync {}", label);
    }
    match report.readiness {
        Some(Readiness::Cloned { attempts }) => {
            println!("  mirror: cloned ({} attempt(s))", attempts)
        }
        Some(Readiness::Updated) => println!("  mirror: updated"),
        None => {}
    }
    if let Some(commit) = &report.commit {
        println!("  commit: {}", commit);
    }
    println!("  scanned: {} files", report.scanned);
    if dry_run {
        println!("  would upsert: {}", report.upserted);
    } else {
        println!("  upserted: {}", report.upserted);
    }
    println!("  unchanged: {}", report.unchanged);
    println!("  unreadable: {}", report.failures.len());
    for failure in &report.failures {
        println!("    {}", failure);
    }
    println!("ok");
}
