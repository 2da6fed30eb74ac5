mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use common::Remote;

fn write_config(remote: &Remote, path_filter: &str) -> PathBuf {
    let config_path = remote.tmp.path().join("repo-sync.toml");
    let content = format!(
        r#"[github]
owner = "acme"
repo = "docs"
branch = "main"
path = "{}"
token = "test-token"
remote_url = "{}"

[mirror]
base_dir = "{}/mirrors"

[store]
path = "{}/data/knowledge.sqlite"
"#,
        path_filter,
        remote.url(),
        remote.tmp.path().display(),
        remote.tmp.path().display(),
    );
    fs::write(&config_path, content).unwrap();
    config_path
}

fn run_cli(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_repo-sync"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .env_remove("GITHUB_TOKEN")
        .output()
        .expect("failed to run repo-sync binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let remote = Remote::with_files(&[("a.md", "alpha")]);
    let config_path = write_config(&remote, "");

    let (stdout, stderr, success) = run_cli(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(remote.tmp.path().join("data/knowledge.sqlite").exists());

    let (_, _, success) = run_cli(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn test_sync_then_resync() {
    let remote = Remote::with_files(&[
        ("guides/a.md", "alpha"),
        ("guides/b.md", "beta"),
        ("README.md", "readme"),
    ]);
    let config_path = write_config(&remote, "guides");

    let (stdout, stderr, success) = run_cli(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("mirror: cloned (1 attempt(s))"));
    assert!(stdout.contains("upserted: 2"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_cli(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("mirror: updated"));
    assert!(stdout.contains("upserted: 0"));
    assert!(stdout.contains("unchanged: 2"));
}

#[test]
fn test_sync_dry_run() {
    let remote = Remote::with_files(&[("a.md", "alpha"), ("b.md", "beta")]);
    let config_path = write_config(&remote, "");

    let (stdout, _, success) = run_cli(&config_path, &["sync", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("would upsert: 2"));

    // Nothing was written, so a real sync still upserts both.
    let (stdout, _, success) = run_cli(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("upserted: 2"));
}

#[test]
fn test_commit_command() {
    let remote = Remote::with_files(&[("guides/a.md", "alpha")]);
    let config_path = write_config(&remote, "");
    let local = remote.tmp.path().join("edit.md");
    fs::write(&local, "edited from cli").unwrap();
    let file_arg = format!("guides/a.md={}", local.display());

    let (stdout, stderr, success) = run_cli(
        &config_path,
        &["commit", "--message", "CLI edit", "--file", &file_arg],
    );
    assert!(success, "commit failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("to main"));
    assert_eq!(remote.show("main", "guides/a.md"), "edited from cli");
}

#[test]
fn test_missing_token_fails() {
    let remote = Remote::with_files(&[("a.md", "alpha")]);
    let config_path = write_config(&remote, "");
    let text = fs::read_to_string(&config_path)
        .unwrap()
        .replace("token = \"test-token\"\n", "");
    fs::write(&config_path, text).unwrap();

    let (_, stderr, success) = run_cli(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("github.token"));
}

#[test]
fn test_failed_clone_exits_nonzero() {
    let remote = Remote::with_files(&[("a.md", "alpha")]);
    let config_path = write_config(&remote, "");
    let text = fs::read_to_string(&config_path)
        .unwrap()
        .replace(&remote.url(), "/nonexistent/remote.git");
    fs::write(&config_path, text).unwrap();

    let (_, stderr, success) = run_cli(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("clone exhausted"));
}
