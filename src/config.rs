//! TOML configuration.
//!
//! A config file names the repository to mirror, where the mirror lives,
//! which files to scan, and where the CLI keeps its knowledge database.
//! The GitHub token may be left out of the file and supplied through
//! `GITHUB_TOKEN` instead.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `github.token` is absent.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub github: GithubConfig,
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Subdirectory to scan; empty means the repository root.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub token: Option<Credential>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Overrides the remote derived from owner and repo.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    pub base_dir: PathBuf,
    #[serde(default = "default_clone_attempts")]
    pub clone_attempts: u32,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_clone_attempts() -> u32 {
    3
}
fn default_author_name() -> String {
    "repo-sync".to_string()
}
fn default_author_email() -> String {
    "repo-sync@users.noreply.github.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/knowledge.sqlite")
}

/// A GitHub access token. `Debug` never prints the secret.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Config {
    /// The validated credential. [`load_config`] guarantees it is present.
    pub fn credential(&self) -> Option<&Credential> {
        self.github.token.as_ref()
    }

    /// Path filter with surrounding slashes removed; empty means root.
    pub fn path_filter(&self) -> &str {
        self.github.path.trim_matches('/')
    }
}

/// Parse and validate a config file. Falls back to `GITHUB_TOKEN` for the
/// credential.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let env_token = std::env::var(TOKEN_ENV).ok();
    parse_config(&content, env_token.as_deref())
}

/// Parse config text. `env_token` stands in for the environment lookup so
/// callers (and tests) control where the fallback credential comes from.
pub fn parse_config(content: &str, env_token: Option<&str>) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.github.token.as_ref().map_or(true, |t| t.is_empty()) {
        config.github.token = env_token
            .filter(|t| !t.trim().is_empty())
            .map(Credential::new);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let gh = &config.github;
    for (field, value) in [
        ("github.owner", &gh.owner),
        ("github.repo", &gh.repo),
        ("github.branch", &gh.branch),
    ] {
        if value.trim().is_empty() {
            bail!("{} must not be empty", field);
        }
    }

    if gh.token.is_none() {
        bail!(
            "github.token must be set in the config file or via {}",
            TOKEN_ENV
        );
    }

    for (field, value) in [("github.owner", &gh.owner), ("github.repo", &gh.repo)] {
        let value = value.trim();
        if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
            bail!("{} must be a single path component, not '{}'", field, value);
        }
    }

    if gh.path.split('/').any(|part| part == "..") {
        bail!("github.path must stay inside the repository");
    }

    if config.mirror.clone_attempts == 0 {
        bail!("mirror.clone_attempts must be >= 1");
    }

    for pattern in config
        .scan
        .include_globs
        .iter()
        .chain(config.scan.exclude_globs.iter())
    {
        Glob::new(pattern).with_context(|| format!("Invalid glob pattern: '{}'", pattern))?;
    }

    Ok(())
}
