//! BLAKE3 content hashing for tamper evidence.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{RunAction, RunId, RunKind, RunRecord};

/// Borrowed view of a run without its hash.
#[derive(Serialize)]
struct HashableRun<'a> {
    id: &'a RunId,
    run_kind: &'a RunKind,
    source: &'a str,
    started_at: &'a DateTime<Utc>,
    completed_at: &'a Option<DateTime<Utc>>,
    summary: &'a serde_json::Value,
    actions: &'a [RunAction],
}

/// Serialize all fields except `content_hash` to JSON and hash the bytes.
/// Returns the hex-encoded digest.
pub fn compute_run_hash(run: &RunRecord) -> Result<String, serde_json::Error> {
    let hashable = HashableRun {
        id: &run.id,
        run_kind: &run.run_kind,
        source: &run.source,
        started_at: &run.started_at,
        completed_at: &run.completed_at,
        summary: &run.summary,
        actions: &run.actions,
    };

    let json = serde_json::to_vec(&hashable)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}
