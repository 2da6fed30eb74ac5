//! Core data types.
//!
//! These types flow from the scanner through the change decision into the
//! knowledge sink.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Tag attached to every record this crate produces.
pub const SOURCE_TAG: &str = "github";

/// Namespace for [`KnowledgeId`] derivation. Changing it changes every id.
const KNOWLEDGE_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_2a4e_8d7b_4c1e_9a36_1b2d_7e4f_c801);

/// One file seen by a scan.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path relative to the mirror root, `/`-separated.
    pub relative_path: String,
    /// Lowercase hex SHA-256 of [`content`](Self::content).
    pub fingerprint: String,
    pub source_tag: &'static str,
    pub content: Vec<u8>,
}

impl FileRecord {
    pub fn new(relative_path: String, content: Vec<u8>) -> Self {
        Self {
            fingerprint: fingerprint(&content),
            relative_path,
            source_tag: SOURCE_TAG,
            content,
        }
    }
}

/// Hex SHA-256 of raw bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stable identifier tying a repository file to a knowledge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeId(Uuid);

impl KnowledgeId {
    /// Derive the id for `relative_path` in `owner/repo`. Pure function of
    /// its inputs.
    pub fn derive(owner: &str, repo: &str, relative_path: &str) -> Self {
        let name = format!("{}/{}/{}", owner, repo, relative_path);
        Self(Uuid::new_v5(&KNOWLEDGE_NAMESPACE, name.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for KnowledgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeMetadata {
    pub path: String,
    pub repo: String,
    pub owner: String,
    pub branch: String,
    /// Mirror HEAD when the file was scanned.
    pub commit: Option<String>,
}

/// What the pipeline hands to [`KnowledgeSink::upsert`](crate::sink::KnowledgeSink::upsert).
#[derive(Debug, Clone)]
pub struct KnowledgeRecord {
    pub id: KnowledgeId,
    pub content: String,
    pub fingerprint: String,
    pub source_tag: String,
    pub metadata: KnowledgeMetadata,
}

/// What a sink remembers about a previously upserted record.
#[derive(Debug, Clone)]
pub struct StoredKnowledge {
    pub id: KnowledgeId,
    pub fingerprint: String,
    pub source_tag: String,
    pub metadata: KnowledgeMetadata,
    pub updated_at: i64,
}
