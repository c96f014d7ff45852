//! Severity and category totals over a set of findings.

use std::collections::BTreeMap;

use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

use estate_core::{Category, NodeKind, Severity};
use estate_graph::GraphStore;

use crate::engine::Finding;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub total_findings: usize,
    /// Every severity is present, zero when unseen.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Only categories that were seen.
    pub by_category: BTreeMap<Category, usize>,
}

impl Default for ClassificationReport {
    fn default() -> Self {
        Self {
            total_findings: 0,
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_category: BTreeMap::new(),
        }
    }
}

impl ClassificationReport {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut report = Self::default();
        for finding in findings {
            report.add(finding.category, finding.severity);
        }
        report
    }

    /// Totals over every Classification node in the store.
    pub async fn from_store(store: &GraphStore) -> Result<Self> {
        let mut report = Self::default();
        let mut nodes = store.nodes_of_labels(&[NodeKind::Classification.label()]);

        while let Some(node) = nodes.try_next().await? {
            let category = node.attr_str("category").and_then(Category::from_label);
            let severity = node.attr_str("severity").and_then(|s| s.parse::<Severity>().ok());
            match (category, severity) {
                (Some(category), Some(severity)) => report.add(category, severity),
                _ => tracing::warn!(key = %node.key, "Skipping malformed classification node"),
            }
        }
        Ok(report)
    }

    pub fn add(&mut self, category: Category, severity: Severity) {
        self.total_findings += 1;
        *self.by_severity.entry(severity).or_insert(0) += 1;
        *self.by_category.entry(category).or_insert(0) += 1;
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}
