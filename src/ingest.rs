//! Ingestion pipeline orchestration.
//!
//! Coordinates one sync run: make the mirror current, scan it, and upsert
//! every file whose fingerprint differs from what the knowledge sink
//! already holds. Files the sink has already seen with the same content are
//! skipped, so re-running on an unchanged tree writes nothing.
//!
//! Unreadable files are logged and counted but do not stop the run. Every
//! other failure (mirror, sink) aborts it.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SyncError, SyncErrorKind, SyncResult};
use crate::mirror::{Readiness, RepositoryMirror};
use crate::models::{FileRecord, KnowledgeId, KnowledgeMetadata, KnowledgeRecord};
use crate::scan::{scan, ScanFilter};
use crate::sink::KnowledgeSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Decide what would change without writing to the sink.
    pub dry_run: bool,
}

/// Identifies the repository the scanned files belong to.
#[derive(Debug, Clone)]
pub struct RepoContext {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub commit: Option<String>,
}

impl RepoContext {
    pub fn from_config(config: &Config, commit: Option<String>) -> Self {
        Self {
            owner: config.github.owner.clone(),
            repo: config.github.repo.clone(),
            branch: config.github.branch.clone(),
            commit,
        }
    }

    pub fn identifier(&self, relative_path: &str) -> KnowledgeId {
        KnowledgeId::derive(&self.owner, &self.repo, relative_path)
    }
}

/// Outcome of one sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub readiness: Option<Readiness>,
    pub commit: Option<String>,
    pub scanned: u64,
    pub upserted: u64,
    pub unchanged: u64,
    /// Files skipped because they could not be read.
    pub failures: Vec<SyncError>,
}

/// Bring the mirror up to date, scan it, and publish changed files.
///
/// Fatal [`SyncError`]s are returned inside the `anyhow::Error` unchanged;
/// use `downcast_ref::<SyncError>()` to inspect the kind.
pub async fn run_sync(
    config: &Config,
    mirror: &RepositoryMirror,
    sink: &dyn KnowledgeSink,
    options: SyncOptions,
) -> Result<SyncReport> {
    let readiness = mirror.ensure_ready()?;
    let commit = match mirror.head_sha() {
        Ok(sha) => Some(sha),
        Err(e) => {
            warn!(error = %e, "could not resolve mirror HEAD");
            None
        }
    };

    let filter = ScanFilter::from_config(&config.scan)?;
    let ctx = RepoContext::from_config(config, commit.clone());
    let records = scan(mirror.local_path(), config.path_filter(), &filter);

    let mut report = ingest_records(&ctx, records, sink, options).await?;
    report.readiness = Some(readiness);
    report.commit = commit;
    Ok(report)
}

/// Decide and upsert each scanned record. Independent of the mirror, so any
/// iterator of records can be fed through it.
pub async fn ingest_records<I>(
    ctx: &RepoContext,
    records: I,
    sink: &dyn KnowledgeSink,
    options: SyncOptions,
) -> SyncResult<SyncReport>
where
    I: Iterator<Item = SyncResult<FileRecord>>,
{
    let mut report = SyncReport::default();

    for item in records {
        let record = match item {
            Ok(record) => record,
            Err(e) if e.reason.is_recoverable() => {
                warn!(error = %e, "skipping unreadable file");
                report.failures.push(e);
                continue;
            }
            Err(e) => return Err(e),
        };
        report.scanned += 1;

        let id = ctx.identifier(&record.relative_path);
        if !needs_upsert(sink, &id, &record).await? {
            debug!(path = %record.relative_path, "unchanged");
            report.unchanged += 1;
            continue;
        }

        if !options.dry_run {
            let knowledge = to_knowledge_record(ctx, id, record);
            sink.upsert(&knowledge).await.map_err(|e| {
                SyncError::new(
                    SyncErrorKind::SinkFailed,
                    format!("upsert of {} failed: {:#}", knowledge.metadata.path, e),
                )
            })?;
            debug!(path = %knowledge.metadata.path, id = %id, "upserted");
        }
        report.upserted += 1;
    }

    info!(
        scanned = report.scanned,
        upserted = report.upserted,
        unchanged = report.unchanged,
        failed = report.failures.len(),
        dry_run = options.dry_run,
        "ingestion finished"
    );
    Ok(report)
}

/// A record needs publishing when the sink has nothing under its id or
/// holds a different fingerprint.
pub async fn needs_upsert(
    sink: &dyn KnowledgeSink,
    id: &KnowledgeId,
    record: &FileRecord,
) -> SyncResult<bool> {
    let stored = sink.get_by_identifier(id).await.map_err(|e| {
        SyncError::new(
            SyncErrorKind::SinkFailed,
            format!("lookup of {} failed: {:#}", record.relative_path, e),
        )
    })?;
    Ok(stored.map_or(true, |s| s.fingerprint != record.fingerprint))
}

pub fn to_knowledge_record(
    ctx: &RepoContext,
    id: KnowledgeId,
    record: FileRecord,
) -> KnowledgeRecord {
    KnowledgeRecord {
        id,
        content: String::from_utf8_lossy(&record.content).into_owned(),
        fingerprint: record.fingerprint,
        source_tag: record.source_tag.to_string(),
        metadata: KnowledgeMetadata {
            path: record.relative_path,
            repo: ctx.repo.clone(),
            owner: ctx.owner.clone(),
            branch: ctx.branch.clone(),
            commit: ctx.commit.clone(),
        },
    }
}
