//! Commit-and-push and pull request workflows against a local bare remote.

mod common;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common::{git, Remote};
use repo_sync::config::Credential;
use repo_sync::error::{SyncError, SyncErrorKind, SyncResult};
use repo_sync::github::{GithubClient, NewPullRequest, PullRequestApi, PullRequestResult};
use repo_sync::ingest::{run_sync, SyncOptions};
use repo_sync::mirror::RepositoryMirror;
use repo_sync::sink::MemorySink;
use repo_sync::writeback::{
    commit_and_push, open_pull_request, CommitSpec, FileEdit, PullRequestSpec,
};
use serde_json::{json, Value};

fn ready_mirror(remote: &Remote) -> RepositoryMirror {
    let config = remote.config("main", "");
    let mirror = RepositoryMirror::new(&config);
    mirror.ensure_ready().unwrap();
    mirror
}

fn commit_count(remote: &Remote, range: &str) -> usize {
    git(&remote.bare, &["rev-list", "--count", range])
        .parse()
        .unwrap()
}

#[test]
fn test_commit_and_push_two_files() {
    let remote = Remote::with_files(&[("guides/a.md", "alpha")]);
    let mirror = ready_mirror(&remote);
    let before = remote.rev("main");

    let result = commit_and_push(
        &mirror,
        &CommitSpec {
            message: "Update guides".to_string(),
            edits: vec![
                FileEdit::new("guides/a.md", "alpha v2"),
                FileEdit::new("guides/new/deep.md", "deep"),
            ],
        },
    )
    .unwrap();

    assert_eq!(result.branch, "main");
    assert_eq!(result.sha, remote.rev("main"));
    assert_eq!(commit_count(&remote, &format!("{}..main", before)), 1);
    assert_eq!(remote.show("main", "guides/a.md"), "alpha v2");
    assert_eq!(remote.show("main", "guides/new/deep.md"), "deep");
    assert_eq!(
        git(&remote.bare, &["log", "-1", "--format=%an <%ae>|%s", "main"]),
        "Sync Bot <bot@example.com>|Update guides"
    );
}

#[test]
fn test_push_rejection_keeps_local_commit() {
    let remote = Remote::with_files(&[("guides/a.md", "alpha")]);
    let mirror = ready_mirror(&remote);

    // Someone else pushes first; the mirror is now behind.
    remote.push_files(&[("guides/other.md", "elsewhere")], "concurrent change");
    let upstream = remote.rev("main");

    let err = commit_and_push(
        &mirror,
        &CommitSpec {
            message: "Local edit".to_string(),
            edits: vec![
                FileEdit::new("guides/a.md", "mine"),
                FileEdit::new("guides/b.md", "also mine"),
            ],
        },
    )
    .unwrap_err();

    assert_eq!(err.reason, SyncErrorKind::PushRejected);
    assert_eq!(remote.rev("main"), upstream, "remote must be untouched");

    // Both edits live in a local, unpushed commit.
    let local = mirror.local_path();
    assert_eq!(git(local, &["log", "-1", "--format=%s"]), "Local edit");
    assert_eq!(git(local, &["show", "HEAD:guides/a.md"]), "mine");
    assert_eq!(git(local, &["show", "HEAD:guides/b.md"]), "also mine");
    assert_eq!(git(local, &["status", "--porcelain"]), "");
}

#[test]
fn test_invalid_path_writes_nothing() {
    let remote = Remote::with_files(&[("a.md", "alpha")]);
    let mirror = ready_mirror(&remote);

    let err = commit_and_push(
        &mirror,
        &CommitSpec {
            message: "Escape".to_string(),
            edits: vec![
                FileEdit::new("b.md", "fine"),
                FileEdit::new("../outside.md", "not fine"),
            ],
        },
    )
    .unwrap_err();

    assert_eq!(err.reason, SyncErrorKind::InvalidPath);
    assert!(!mirror.local_path().join("b.md").exists());
}

#[test]
fn test_unchanged_content_cannot_commit() {
    let remote = Remote::with_files(&[("a.md", "alpha")]);
    let mirror = ready_mirror(&remote);

    let err = commit_and_push(
        &mirror,
        &CommitSpec {
            message: "Nothing new".to_string(),
            edits: vec![FileEdit::new("a.md", "alpha")],
        },
    )
    .unwrap_err();
    assert_eq!(err.reason, SyncErrorKind::CommitFailed);
}

#[tokio::test]
async fn test_sync_after_rejected_push_fails_without_reset() {
    let remote = Remote::with_files(&[("guides/a.md", "alpha")]);
    let config = remote.config("main", "");
    let mirror = ready_mirror(&remote);

    remote.push_files(&[("guides/other.md", "elsewhere")], "concurrent change");
    let err = commit_and_push(
        &mirror,
        &CommitSpec {
            message: "Local edit".to_string(),
            edits: vec![FileEdit::new("guides/a.md", "mine")],
        },
    )
    .unwrap_err();
    assert_eq!(err.reason, SyncErrorKind::PushRejected);
    let local_head = mirror.head_sha().unwrap();

    let sink = MemorySink::new();
    let err = run_sync(&config, &mirror, &sink, SyncOptions::default())
        .await
        .unwrap_err();
    let sync_err = err.downcast_ref::<SyncError>().unwrap();
    assert_eq!(sync_err.reason, SyncErrorKind::PullFailed);
    assert!(sink.is_empty());

    // The unpushed commit is still there, untouched.
    assert_eq!(mirror.head_sha().unwrap(), local_head);
    assert_eq!(
        git(mirror.local_path(), &["show", "HEAD:guides/a.md"]),
        "mine"
    );
    assert!(!mirror.local_path().join("guides/other.md").exists());
}

/// Records requests and answers with a canned result.
struct FakeApi {
    requests: Mutex<Vec<NewPullRequest>>,
    reject: bool,
}

impl FakeApi {
    fn new(reject: bool) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reject,
        }
    }
}

#[async_trait]
impl PullRequestApi for FakeApi {
    async fn create_pull_request(&self, request: &NewPullRequest) -> SyncResult<PullRequestResult> {
        self.requests.lock().unwrap().push(request.clone());
        if self.reject {
            return Err(SyncError::new(
                SyncErrorKind::PullRequestRejected,
                "No commits between main and head",
            ));
        }
        Ok(PullRequestResult {
            number: 42,
            url: "https://github.com/acme/docs/pull/42".to_string(),
            branch: request.head.clone(),
        })
    }
}

#[tokio::test]
async fn test_open_pull_request() {
    let remote = Remote::with_files(&[("guides/a.md", "old text")]);
    let mirror = ready_mirror(&remote);
    let api = FakeApi::new(false);

    let result = open_pull_request(
        &mirror,
        &api,
        &PullRequestSpec {
            title: "Update docs".to_string(),
            branch: "auto/update-1".to_string(),
            description: Some("Automated update".to_string()),
            edits: vec![FileEdit::new("guides/a.md", "new text")],
        },
    )
    .await
    .unwrap();

    assert!(!result.url.is_empty());
    assert_eq!(result.branch, "auto/update-1");

    assert!(remote.has_branch("auto/update-1"));
    assert_eq!(commit_count(&remote, "main..auto/update-1"), 1);
    assert_eq!(remote.show("auto/update-1", "guides/a.md"), "new text");
    assert_eq!(remote.show("main", "guides/a.md"), "old text");

    let requests = api.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].title, "Update docs");
    assert_eq!(requests[0].body, "Automated update");
    assert_eq!(requests[0].head, "auto/update-1");
    assert_eq!(requests[0].base, "main");

    assert_eq!(mirror.current_branch().unwrap().as_deref(), Some("main"));
}

#[tokio::test]
async fn test_pull_request_branch_already_exists() {
    let remote = Remote::with_files(&[("guides/a.md", "old text")]);
    remote.push_branch("auto/update-1");
    let mirror = ready_mirror(&remote);
    let api = FakeApi::new(false);

    let err = open_pull_request(
        &mirror,
        &api,
        &PullRequestSpec {
            title: "Update docs".to_string(),
            branch: "auto/update-1".to_string(),
            description: None,
            edits: vec![FileEdit::new("guides/a.md", "new text")],
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.reason, SyncErrorKind::BranchCreateFailed);
    assert!(api.requests.lock().unwrap().is_empty());
    assert_eq!(mirror.current_branch().unwrap().as_deref(), Some("main"));
}

#[tokio::test]
async fn test_pull_request_rejected_returns_to_base() {
    let remote = Remote::with_files(&[("guides/a.md", "old text")]);
    let mirror = ready_mirror(&remote);
    let api = FakeApi::new(true);

    let err = open_pull_request(
        &mirror,
        &api,
        &PullRequestSpec {
            title: "Update docs".to_string(),
            branch: "auto/update-2".to_string(),
            description: None,
            edits: vec![FileEdit::new("guides/a.md", "new text")],
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.reason, SyncErrorKind::PullRequestRejected);
    // The branch was pushed before the API refused.
    assert!(remote.has_branch("auto/update-2"));
    assert_eq!(mirror.current_branch().unwrap().as_deref(), Some("main"));
    assert_eq!(
        fs::read_to_string(mirror.local_path().join("guides/a.md")).unwrap(),
        "old text"
    );
}

fn pr_spec(branch: &str, content: &str) -> PullRequestSpec {
    PullRequestSpec {
        title: "Update docs".to_string(),
        branch: branch.to_string(),
        description: None,
        edits: vec![FileEdit::new("guides/a.md", content)],
    }
}

#[tokio::test]
async fn test_pull_request_without_changes_is_rejected() {
    let remote = Remote::with_files(&[("guides/a.md", "old text")]);
    let mirror = ready_mirror(&remote);
    let api = FakeApi::new(false);

    let err = open_pull_request(&mirror, &api, &pr_spec("auto/update-1", "old text"))
        .await
        .unwrap_err();

    assert_eq!(err.reason, SyncErrorKind::PullRequestRejected);
    assert!(err.detail.contains("no diff"));
    assert!(api.requests.lock().unwrap().is_empty());
    assert!(!remote.has_branch("auto/update-1"));
    assert_eq!(mirror.current_branch().unwrap().as_deref(), Some("main"));

    // The branch name is free again for a real change.
    let result = open_pull_request(&mirror, &api, &pr_spec("auto/update-1", "new text"))
        .await
        .unwrap();
    assert_eq!(result.branch, "auto/update-1");
    assert_eq!(remote.show("auto/update-1", "guides/a.md"), "new text");
    assert_eq!(mirror.current_branch().unwrap().as_deref(), Some("main"));
}

// GitHub client against a local HTTP server

#[derive(Clone)]
struct MockGithub {
    status: StatusCode,
    response: Value,
    seen: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn create_pull(
    State(state): State<MockGithub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.seen.lock().unwrap().push((auth, body));
    (state.status, Json(state.response.clone()))
}

async fn spawn_github(state: MockGithub) -> String {
    let app = Router::new()
        .route("/repos/{owner}/{repo}/pulls", post(create_pull))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn request() -> NewPullRequest {
    NewPullRequest {
        title: "Update docs".to_string(),
        body: "Automated".to_string(),
        head: "auto/update-1".to_string(),
        base: "main".to_string(),
    }
}

#[tokio::test]
async fn test_github_client_creates_pull_request() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let url = spawn_github(MockGithub {
        status: StatusCode::CREATED,
        response: json!({"number": 7, "html_url": "https://github.com/acme/docs/pull/7"}),
        seen: seen.clone(),
    })
    .await;

    let client = GithubClient::new(
        &url,
        "acme",
        "docs",
        Credential::new("ghp_test"),
        Duration::from_secs(5),
    )
    .unwrap();
    let result = client.create_pull_request(&request()).await.unwrap();

    assert_eq!(result.number, 7);
    assert_eq!(result.url, "https://github.com/acme/docs/pull/7");
    assert_eq!(result.branch, "auto/update-1");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "Bearer ghp_test");
    assert_eq!(
        seen[0].1,
        json!({
            "title": "Update docs",
            "body": "Automated",
            "head": "auto/update-1",
            "base": "main"
        })
    );
}

#[tokio::test]
async fn test_github_client_rejection() {
    let url = spawn_github(MockGithub {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        response: json!({
            "message": "Validation Failed",
            "errors": [{
                "resource": "PullRequest",
                "code": "custom",
                "message": "No commits between main and auto/update-1"
            }]
        }),
        seen: Arc::new(Mutex::new(Vec::new())),
    })
    .await;

    let client = GithubClient::new(
        &url,
        "acme",
        "docs",
        Credential::new("ghp_test"),
        Duration::from_secs(5),
    )
    .unwrap();
    let err = client.create_pull_request(&request()).await.unwrap_err();

    assert_eq!(err.reason, SyncErrorKind::PullRequestRejected);
    assert!(err.detail.contains("No commits between main and auto/update-1"));
}

#[tokio::test]
async fn test_github_client_unreachable() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = GithubClient::new(
        &format!("http://{}", addr),
        "acme",
        "docs",
        Credential::new("ghp_test"),
        Duration::from_secs(2),
    )
    .unwrap();
    let err = client.create_pull_request(&request()).await.unwrap_err();
    assert_eq!(err.reason, SyncErrorKind::PullRequestRejected);
}
