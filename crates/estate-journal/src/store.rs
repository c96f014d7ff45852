//! Journal persistence: trait + file-backed implementation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{RunId, RunKind, RunRecord};

/// Errors from journal storage.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Run not found: {0}")]
    NotFound(RunId),

    #[error("Integrity check failed for run {0}: stored hash does not match content")]
    IntegrityViolation(RunId),

    #[error("Run has no content hash (not finalized)")]
    NotFinalized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filters for [`JournalStore::list`].
#[derive(Debug, Default, Clone)]
pub struct RunQuery {
    pub run_kind: Option<RunKind>,
    pub source: Option<String>,
    /// Only runs started at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only runs started at or before this time.
    pub to: Option<DateTime<Utc>>,
    /// Most recent N runs.
    pub limit: Option<usize>,
}

impl RunQuery {
    fn matches(&self, run: &RunRecord) -> bool {
        self.run_kind.map_or(true, |k| run.run_kind == k)
            && self.source.as_ref().map_or(true, |s| &run.source == s)
            && self.from.map_or(true, |from| run.started_at >= from)
            && self.to.map_or(true, |to| run.started_at <= to)
    }
}

/// Persistence backend for run records.
pub trait JournalStore {
    /// Store a finalized run.
    fn save(&self, run: &RunRecord) -> Result<(), JournalError>;

    /// Load a run, verifying its content hash.
    fn get(&self, id: RunId) -> Result<RunRecord, JournalError>;

    /// Runs matching `query`, newest first. Records failing their integrity
    /// check are left out.
    fn list(&self, query: &RunQuery) -> Result<Vec<RunRecord>, JournalError>;
}

/// Journal stored as one JSON file per run:
/// ```text
/// {root}/
///   2024/
///     05/
///       01/
///         {run_id}.json
/// ```
pub struct FileJournal {
    root: PathBuf,
}

impl FileJournal {
    /// Open a journal rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, run: &RunRecord) -> PathBuf {
        let day = run.started_at.format("%Y/%m/%d");
        self.root.join(format!("{day}/{}.json", run.id))
    }

    fn locate(&self, id: RunId) -> Result<PathBuf, JournalError> {
        let wanted = id.to_string();
        json_files(&self.root)?
            .into_iter()
            .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(wanted.as_str()))
            .ok_or(JournalError::NotFound(id))
    }
}

impl JournalStore for FileJournal {
    fn save(&self, run: &RunRecord) -> Result<(), JournalError> {
        if run.content_hash.is_none() {
            return Err(JournalError::NotFinalized);
        }

        let path = self.run_path(run);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(run)?)?;

        tracing::debug!(run_id = %run.id, path = %path.display(), "Run journaled");
        Ok(())
    }

    fn get(&self, id: RunId) -> Result<RunRecord, JournalError> {
        let path = self.locate(id)?;
        let run: RunRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
        if !run.verify_integrity() {
            return Err(JournalError::IntegrityViolation(id));
        }
        Ok(run)
    }

    fn list(&self, query: &RunQuery) -> Result<Vec<RunRecord>, JournalError> {
        let mut runs = Vec::new();
        for path in json_files(&self.root)? {
            let run: RunRecord = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if !run.verify_integrity() {
                tracing::warn!(run_id = %run.id, path = %path.display(), "Skipping tampered run");
                continue;
            }
            if query.matches(&run) {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = query.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }
}

/// Every `.json` file below `root`.
fn json_files(root: &Path) -> Result<Vec<PathBuf>, JournalError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                found.push(path);
            }
        }
    }
    Ok(found)
}
