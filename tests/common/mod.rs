//! Shared fixtures: a bare repository standing in for GitHub, plus a seed
//! working copy used to push "upstream" changes into it.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use repo_sync::config::{parse_config, Config};
use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Upstream",
            "-c",
            "user.email=upstream@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {:?}: {}", args, e));
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub struct Remote {
    pub tmp: TempDir,
    pub bare: PathBuf,
    pub seed: PathBuf,
}

impl Remote {
    /// A remote whose `main` branch holds `files`.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let tmp = TempDir::new().unwrap();
        let bare = tmp.path().join("remote.git");
        let seed = tmp.path().join("seed");
        fs::create_dir_all(&bare).unwrap();
        fs::create_dir_all(&seed).unwrap();

        git(&bare, &["init", "--bare", "--quiet"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        git(&seed, &["init", "--quiet"]);
        git(&seed, &["checkout", "--quiet", "-b", "main"]);
        git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);

        let remote = Self { tmp, bare, seed };
        remote.push_files(files, "initial import");
        remote
    }

    /// Commit `files` on the seed's current branch and push it.
    pub fn push_files(&self, files: &[(&str, &str)], message: &str) {
        for (path, content) in files {
            let target = self.seed.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        git(&self.seed, &["add", "-A"]);
        git(&self.seed, &["commit", "--quiet", "-m", message]);
        let branch = git(&self.seed, &["symbolic-ref", "--short", "HEAD"]);
        git(&self.seed, &["push", "--quiet", "origin", &branch]);
    }

    /// Create `branch` on the remote from the current seed HEAD.
    pub fn push_branch(&self, branch: &str) {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        git(&self.seed, &["push", "--quiet", "origin", &refspec]);
    }

    /// `git show <rev>:<path>` against the bare remote.
    pub fn show(&self, rev: &str, path: &str) -> String {
        git(&self.bare, &["show", &format!("{}:{}", rev, path)])
    }

    pub fn rev(&self, rev: &str) -> String {
        git(&self.bare, &["rev-parse", rev])
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)])
            .current_dir(&self.bare)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn url(&self) -> String {
        self.bare.to_string_lossy().to_string()
    }

    /// Directory that mirrors are cloned under.
    pub fn base_dir(&self) -> PathBuf {
        self.tmp.path().join("mirrors")
    }

    pub fn config(&self, branch: &str, path: &str) -> Config {
        let text = format!(
            r#"
[github]
owner = "acme"
repo = "docs"
branch = "{branch}"
path = "{path}"
token = "test-token"
remote_url = "{remote}"

[mirror]
base_dir = "{base}"
author_name = "Sync Bot"
author_email = "bot@example.com"

[store]
path = "{db}"
"#,
            branch = branch,
            path = path,
            remote = self.url().replace('\\', "\\\\"),
            base = self.base_dir().to_string_lossy().replace('\\', "\\\\"),
            db = self
                .tmp
                .path()
                .join("data/knowledge.sqlite")
                .to_string_lossy()
                .replace('\\', "\\\\"),
        );
        parse_config(&text, None).unwrap()
    }
}
