//! Thin wrapper over the `git` command-line tool.
//!
//! [`GitBackend`] is the seam between the mirror and the process that
//! actually talks to the remote. [`CliGit`] shells out to `git`; tests wrap
//! it to inject clone failures.

use base64::Engine;
use std::path::Path;
use std::process::Command;

use crate::config::Credential;

/// Captured result of one `git` invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Trimmed stdout, the form every caller wants for single-value commands.
    pub fn value(&self) -> String {
        self.stdout.trim().to_string()
    }

    /// The most useful single-line description of a failure.
    pub fn message(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }
}

/// Runs git commands. `Err` means git could not be started at all; a git
/// command that ran and failed comes back as `Ok` with `success == false`.
pub trait GitBackend: Send + Sync {
    /// Clone `url` into `dest`.
    fn clone_repo(&self, url: &str, dest: &Path) -> std::io::Result<GitOutput>;

    /// Run `git <args>` inside `repo`. `network` marks commands that talk to
    /// the remote and therefore need credentials.
    fn run(&self, repo: &Path, args: &[&str], network: bool) -> std::io::Result<GitOutput>;
}

/// [`GitBackend`] backed by the system `git` binary.
///
/// For `https://` remotes the credential travels as an `http.extraHeader`
/// on each network command, so it is never stored in `.git/config`.
pub struct CliGit {
    auth_header: Option<String>,
}

impl CliGit {
    pub fn new(credential: Option<&Credential>, remote_url: &str) -> Self {
        let auth_header = credential
            .filter(|_| remote_url.starts_with("https://"))
            .map(|c| basic_auth_header(c.expose()));
        Self { auth_header }
    }

    fn command(&self, network: bool) -> Command {
        let mut cmd = Command::new("git");
        // Never block on an interactive credential prompt.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if network {
            if let Some(header) = &self.auth_header {
                cmd.arg("-c").arg(format!("http.extraHeader={}", header));
            }
        }
        cmd
    }
}

impl GitBackend for CliGit {
    fn clone_repo(&self, url: &str, dest: &Path) -> std::io::Result<GitOutput> {
        let mut cmd = self.command(true);
        cmd.arg("clone").arg(url).arg(dest);
        capture(cmd)
    }

    fn run(&self, repo: &Path, args: &[&str], network: bool) -> std::io::Result<GitOutput> {
        let mut cmd = self.command(network);
        cmd.args(args).current_dir(repo);
        capture(cmd)
    }
}

fn capture(mut cmd: Command) -> std::io::Result<GitOutput> {
    let output = cmd.output()?;
    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// GitHub accepts a token as the password of a basic-auth pair whose user
/// is `x-access-token`.
fn basic_auth_header(token: &str) -> String {
    let pair = format!("x-access-token:{}", token);
    format!(
        "Authorization: Basic {}",
        base64::engine::general_purpose::STANDARD.encode(pair)
    )
}
