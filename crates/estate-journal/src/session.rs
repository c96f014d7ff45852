//! Builder for recording a run as it happens.
//!
//! ```no_run
//! # use estate_journal::{RunKind, RunSession};
//! let mut session = RunSession::new(RunKind::Ingestion, "sql_schema");
//! session.add_action(
//!     "chunk_commit",
//!     "Chunk 0 committed",
//!     serde_json::json!({"mutations": 100}),
//!     true,
//! );
//! session.set_summary(serde_json::json!({"nodes_upserted": 100}));
//! let run = session.finalize().unwrap();
//! assert!(run.content_hash.is_some());
//! ```

use chrono::Utc;

use crate::{RunAction, RunId, RunKind, RunRecord};

/// Records a run incrementally; [`RunSession::finalize`] seals it.
pub struct RunSession {
    run: RunRecord,
}

impl RunSession {
    pub fn new(run_kind: RunKind, source: &str) -> Self {
        Self {
            run: RunRecord {
                id: RunId::new(),
                run_kind,
                source: source.to_string(),
                started_at: Utc::now(),
                completed_at: None,
                summary: serde_json::Value::Null,
                actions: Vec::new(),
                content_hash: None,
            },
        }
    }

    pub fn set_summary(&mut self, summary: serde_json::Value) {
        self.run.summary = summary;
    }

    pub fn add_action(
        &mut self,
        action_type: &str,
        description: &str,
        details: serde_json::Value,
        success: bool,
    ) {
        self.run.actions.push(RunAction {
            action_type: action_type.to_string(),
            description: description.to_string(),
            details,
            success,
            timestamp: Utc::now(),
        });
    }

    pub fn id(&self) -> RunId {
        self.run.id
    }

    /// Set `completed_at` and compute the content hash.
    pub fn finalize(mut self) -> Result<RunRecord, serde_json::Error> {
        self.run.completed_at = Some(Utc::now());
        let hash = self.run.compute_hash()?;
        self.run.content_hash = Some(hash);
        Ok(self.run)
    }
}
