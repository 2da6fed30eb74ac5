//! Knowledge sink abstraction.
//!
//! The [`KnowledgeSink`] trait is everything the sync pipeline needs from
//! the store that receives repository files: a lookup by
//! [`KnowledgeId`] and an upsert. The pipeline never reads content back;
//! only the stored fingerprint matters for the skip decision.
//!
//! | Implementation | Backing | Use |
//! |----------------|---------|-----|
//! | [`MemorySink`] | `HashMap` behind `RwLock` | tests, embedding in other processes |
//! | [`SqliteSink`] | SQLite via `sqlx` | the `repo-sync` CLI |

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::models::{KnowledgeId, KnowledgeMetadata, KnowledgeRecord, StoredKnowledge};

/// Destination for repository files.
///
/// Implementations must offer read-your-write consistency for a single
/// identifier: after `upsert` returns, `get_by_identifier` for the same id
/// sees the new fingerprint.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// The record previously stored under `id`, if any.
    async fn get_by_identifier(&self, id: &KnowledgeId) -> Result<Option<StoredKnowledge>>;

    /// Insert or replace the record stored under `record.id`.
    async fn upsert(&self, record: &KnowledgeRecord) -> Result<()>;
}

struct StoredEntry {
    record: KnowledgeRecord,
    updated_at: i64,
}

/// In-memory sink. Also keeps the order of upserts, which tests use to see
/// exactly which identifiers a run touched.
pub struct MemorySink {
    records: RwLock<HashMap<KnowledgeId, StoredEntry>>,
    history: RwLock<Vec<KnowledgeId>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content stored under `id`.
    pub fn content(&self, id: &KnowledgeId) -> Option<String> {
        let records = self.records.read().ok()?;
        records.get(id).map(|e| e.record.content.clone())
    }

    /// Every id passed to `upsert`, oldest first.
    pub fn upserted_ids(&self) -> Vec<KnowledgeId> {
        self.history.read().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut h) = self.history.write() {
            h.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeSink for MemorySink {
    async fn get_by_identifier(&self, id: &KnowledgeId) -> Result<Option<StoredKnowledge>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?;
        Ok(records.get(id).map(|e| StoredKnowledge {
            id: e.record.id,
            fingerprint: e.record.fingerprint.clone(),
            source_tag: e.record.source_tag.clone(),
            metadata: e.record.metadata.clone(),
            updated_at: e.updated_at,
        }))
    }

    async fn upsert(&self, record: &KnowledgeRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?;
        records.insert(
            record.id,
            StoredEntry {
                record: record.clone(),
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        self.history
            .write()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?
            .push(record.id);
        Ok(())
    }
}

/// SQLite-backed sink storing one row per identifier in `knowledge`.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Open (creating if needed) the database at `path` and make sure the
    /// schema exists. Safe to call repeatedly.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let sink = Self { pool };
        sink.migrate().await?;
        Ok(sink)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `knowledge` table and its lookup index.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                source TEXT NOT NULL,
                path TEXT NOT NULL,
                repo TEXT NOT NULL,
                owner TEXT NOT NULL,
                branch TEXT NOT NULL,
                git_commit TEXT,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_repo_path ON knowledge(owner, repo, path)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl KnowledgeSink for SqliteSink {
    async fn get_by_identifier(&self, id: &KnowledgeId) -> Result<Option<StoredKnowledge>> {
        let row = sqlx::query(
            "SELECT id, fingerprint, source, path, repo, owner, branch, git_commit, updated_at \
             FROM knowledge WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_id: String = row.get("id");
        let id = KnowledgeId::parse(&raw_id)
            .ok_or_else(|| anyhow!("corrupt knowledge id in database: {}", raw_id))?;

        Ok(Some(StoredKnowledge {
            id,
            fingerprint: row.get("fingerprint"),
            source_tag: row.get("source"),
            metadata: KnowledgeMetadata {
                path: row.get("path"),
                repo: row.get("repo"),
                owner: row.get("owner"),
                branch: row.get("branch"),
                commit: row.get("git_commit"),
            },
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert(&self, record: &KnowledgeRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO knowledge
                (id, content, fingerprint, source, path,
                 repo, owner, branch, git_commit, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                fingerprint = excluded.fingerprint,
                source = excluded.source,
                path = excluded.path,
                repo = excluded.repo,
                owner = excluded.owner,
                branch = excluded.branch,
                git_commit = excluded.git_commit,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.content)
        .bind(&record.fingerprint)
        .bind(&record.source_tag)
        .bind(&record.metadata.path)
        .bind(&record.metadata.repo)
        .bind(&record.metadata.owner)
        .bind(&record.metadata.branch)
        .bind(&record.metadata.commit)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
