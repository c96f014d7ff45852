//! Run journal helpers for classification passes.

use estate_journal::{FileJournal, JournalStore, RunKind, RunRecord, RunSession};

use crate::run::ClassificationRunSummary;

pub fn classification_run(
    source: &str,
    summary: &ClassificationRunSummary,
) -> Result<RunRecord, serde_json::Error> {
    let mut session = RunSession::new(RunKind::Classification, source);

    session.add_action(
        "classify",
        &format!(
            "Classified {} assets, {} sensitive, {} findings written",
            summary.assets_scanned, summary.assets_sensitive, summary.findings_written
        ),
        serde_json::to_value(&summary.report)?,
        summary.write_failures.is_empty(),
    );
    for failure in &summary.write_failures {
        session.add_action(
            "write_classifications",
            &format!("Failed to write findings for {}", failure.asset),
            serde_json::to_value(failure)?,
            false,
        );
    }

    session.set_summary(serde_json::to_value(summary)?);
    session.finalize()
}

/// Journal the pass under `journal_dir`; failures are logged only.
pub fn record_classification(
    source: &str,
    summary: &ClassificationRunSummary,
    journal_dir: &str,
) -> Option<RunRecord> {
    let run = classification_run(source, summary)
        .map_err(|e| tracing::warn!(error = %e, "Failed to build classification run record"))
        .ok()?;

    match FileJournal::new(journal_dir).and_then(|journal| journal.save(&run)) {
        Ok(()) => tracing::info!(run_id = %run.id, "Classification run journaled"),
        Err(e) => tracing::warn!(error = %e, "Failed to journal classification run"),
    }
    Some(run)
}
