//! Run journal helpers for ingestion.

use estate_journal::{FileJournal, JournalStore, RunKind, RunRecord, RunSession};

use crate::summary::IngestionSummary;

/// Build the journal record for one ingested batch.
pub fn ingestion_run(summary: &IngestionSummary) -> Result<RunRecord, serde_json::Error> {
    let mut session = RunSession::new(RunKind::Ingestion, &summary.source);

    for failure in &summary.chunk_failures {
        session.add_action(
            "chunk_commit",
            &format!(
                "Chunk {} failed after {} attempts",
                failure.chunk_index, failure.attempts
            ),
            serde_json::to_value(failure)?,
            false,
        );
    }
    for error in &summary.record_errors {
        session.add_action(
            "record_skipped",
            &format!("{:?}: {}", error.kind, error.entity),
            serde_json::to_value(error)?,
            false,
        );
    }
    if summary.cancelled {
        session.add_action(
            "cancel",
            "Ingestion cancelled between chunks",
            serde_json::json!({ "chunks_committed": summary.chunks_committed }),
            true,
        );
    }

    session.set_summary(serde_json::to_value(summary)?);
    session.finalize()
}

/// Journal the summary under `journal_dir`. Failures are logged, never fatal
/// to the ingestion itself.
pub fn record_ingestion(summary: &IngestionSummary, journal_dir: &str) -> Option<RunRecord> {
    let run = match ingestion_run(summary) {
        Ok(run) => run,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build ingestion run record");
            return None;
        }
    };

    match FileJournal::new(journal_dir).and_then(|journal| journal.save(&run)) {
        Ok(()) => {
            tracing::info!(
                run_id = %run.id,
                batch_id = %summary.batch_id,
                "Ingestion run journaled"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Failed to journal ingestion run"),
    }
    Some(run)
}
