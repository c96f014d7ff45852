//! estate-journal: tamper-evident record of ingestion and classification runs.
//!
//! Each run (one collector batch ingested, one classification pass) is
//! captured as a [`RunRecord`]: what ran, when, its structured summary and
//! the notable actions taken. Records are content-hashed with BLAKE3 so the
//! dashboard can tell when a stored summary was edited after the fact.

pub mod hash;
pub mod session;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use session::RunSession;
pub use store::{FileJournal, JournalError, JournalStore, RunQuery};

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of work a run performed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Ingestion,
    Classification,
}

/// A notable step within a run (a chunk that failed, a detector error, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunAction {
    /// Type of action (e.g. "chunk_commit", "record_skipped").
    pub action_type: String,
    pub description: String,
    pub details: serde_json::Value,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// One finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub id: RunId,
    pub run_kind: RunKind,
    /// Collector or target the run worked on (e.g. "sql_schema").
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The run's structured summary, as rendered by the dashboard.
    pub summary: serde_json::Value,
    pub actions: Vec<RunAction>,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl RunRecord {
    /// Hash of every field except `content_hash`.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        hash::compute_run_hash(self)
    }

    /// Whether the stored hash matches the content.
    pub fn verify_integrity(&self) -> bool {
        match (&self.content_hash, self.compute_hash()) {
            (Some(stored), Ok(actual)) => stored == &actual,
            _ => false,
        }
    }
}
