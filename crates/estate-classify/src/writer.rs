//! Persists findings as `Classification` nodes linked to their asset.

use chrono::{DateTime, Utc};
use serde_json::json;

use estate_core::keys::classification_key;
use estate_core::{EdgeKind, NodeKey, NodeKind, Properties};
use estate_graph::GraphStore;

use crate::engine::Finding;
use crate::error::Result;

/// Writes findings back into the graph.
///
/// A Classification node is keyed by (asset, category), so classifying the
/// same asset again overwrites confidence, severity and timestamp in place.
#[derive(Clone)]
pub struct ClassificationWriter {
    store: GraphStore,
}

impl ClassificationWriter {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    /// Upsert one Classification node and its `CLASSIFIED_AS` edge per
    /// finding, all in one write transaction. The asset must already exist.
    /// Returns the number of findings written.
    pub async fn write(
        &self,
        asset: &NodeKey,
        findings: &[Finding],
        scanned_at: DateTime<Utc>,
    ) -> Result<usize> {
        if findings.is_empty() {
            return Ok(0);
        }

        let mut txn = self.store.begin_write().await?;
        for finding in findings {
            let key = classification_key(asset, finding.category)?;
            let attributes = classification_attributes(asset, finding, scanned_at);
            txn.upsert_node(NodeKind::Classification.label(), &key, &attributes, scanned_at)
                .await?;

            let target = NodeKey::new(NodeKind::Classification, key);
            txn.upsert_edge(EdgeKind::ClassifiedAs, asset, &target, &Properties::new(), scanned_at)
                .await?;
        }
        txn.commit().await?;

        tracing::debug!(asset = %asset, findings = findings.len(), "Classifications written");
        Ok(findings.len())
    }
}

fn classification_attributes(
    asset: &NodeKey,
    finding: &Finding,
    scanned_at: DateTime<Utc>,
) -> Properties {
    let mut attributes = Properties::new();
    attributes.insert("category".to_string(), json!(finding.category.label()));
    attributes.insert("confidence".to_string(), json!(finding.confidence));
    attributes.insert("severity".to_string(), json!(finding.severity.as_str()));
    attributes.insert("severity_rank".to_string(), json!(finding.severity.rank()));
    attributes.insert("detector".to_string(), json!(finding.detector.as_str()));
    attributes.insert("target_label".to_string(), json!(asset.label));
    attributes.insert("target_key".to_string(), json!(asset.key));
    attributes.insert("scanned_at".to_string(), json!(scanned_at.to_rfc3339()));
    attributes
}
