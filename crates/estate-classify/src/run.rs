//! Classification passes over the stored graph.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

use estate_core::{NodeKey, NodeKind};
use estate_graph::{GraphStore, NodeRecord};

use crate::engine::{BlobSample, ClassificationEngine, ClassificationOutcome, ColumnDescriptor};
use crate::error::Result;
use crate::report::ClassificationReport;
use crate::writer::ClassificationWriter;

/// An asset whose findings could not be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub asset: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRunSummary {
    pub scanned_at: DateTime<Utc>,
    pub assets_scanned: usize,
    pub assets_sensitive: usize,
    pub findings_written: usize,
    pub detector_errors: usize,
    pub write_failures: Vec<WriteFailure>,
    pub report: ClassificationReport,
    pub duration_ms: u64,
}

impl ClassificationRunSummary {
    fn new(scanned_at: DateTime<Utc>) -> Self {
        Self {
            scanned_at,
            assets_scanned: 0,
            assets_sensitive: 0,
            findings_written: 0,
            detector_errors: 0,
            write_failures: Vec::new(),
            report: ClassificationReport::default(),
            duration_ms: 0,
        }
    }
}

/// Reads scan targets from the store, classifies them and writes the
/// findings back.
pub struct ClassificationRun {
    store: GraphStore,
    engine: ClassificationEngine,
    writer: ClassificationWriter,
}

impl ClassificationRun {
    pub fn new(store: GraphStore, engine: ClassificationEngine) -> Self {
        let writer = ClassificationWriter::new(store.clone());
        Self {
            store,
            engine,
            writer,
        }
    }

    /// Classify every stored `Column` from its name and `sample_values`.
    ///
    /// Columns are read completely before the first write. A failed write is
    /// recorded and the pass continues with the next column.
    pub async fn classify_columns(
        &self,
        scanned_at: DateTime<Utc>,
    ) -> Result<ClassificationRunSummary> {
        let started = Instant::now();
        let columns: Vec<NodeRecord> = self
            .store
            .nodes_of_labels(&[NodeKind::Column.label()])
            .try_collect()
            .await?;

        tracing::info!(columns = columns.len(), "Classifying columns");

        let mut summary = ClassificationRunSummary::new(scanned_at);
        for node in &columns {
            let outcome = self.engine.classify_column(&ColumnDescriptor::from_node(node));
            self.apply(&node.node_key(), &outcome, &mut summary).await;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            scanned = summary.assets_scanned,
            sensitive = summary.assets_sensitive,
            written = summary.findings_written,
            failures = summary.write_failures.len(),
            duration_ms = summary.duration_ms,
            "Column classification complete"
        );
        Ok(summary)
    }

    /// Classify a file sample and link the findings to its `Blob` node.
    pub async fn classify_blob(
        &self,
        asset: &NodeKey,
        sample: &BlobSample,
        scanned_at: DateTime<Utc>,
    ) -> Result<ClassificationOutcome> {
        self.store.require_node(asset).await?;
        let outcome = self.engine.classify_blob(sample);
        self.writer.write(asset, &outcome.findings, scanned_at).await?;
        Ok(outcome)
    }

    async fn apply(
        &self,
        asset: &NodeKey,
        outcome: &ClassificationOutcome,
        summary: &mut ClassificationRunSummary,
    ) {
        summary.assets_scanned += 1;
        summary.detector_errors += outcome.detector_errors.len();
        if !outcome.is_sensitive() {
            return;
        }
        summary.assets_sensitive += 1;

        match self
            .writer
            .write(asset, &outcome.findings, summary.scanned_at)
            .await
        {
            Ok(written) => {
                summary.findings_written += written;
                for finding in &outcome.findings {
                    summary.report.add(finding.category, finding.severity);
                }
            }
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Failed to write classifications");
                summary.write_failures.push(WriteFailure {
                    asset: asset.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}
