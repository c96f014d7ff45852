//! Combines detector signals into findings.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use estate_core::{Category, Severity};
use estate_graph::NodeRecord;

use crate::detectors::{self, DetectorKind, MatchMode, ScanInput, Signal};
use crate::error::DetectorError;
use crate::tables::ClassificationTables;

/// A column to classify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub sample_values: Vec<Value>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, sample_values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            sample_values,
        }
    }

    /// Read name, data type and samples off a stored `Column` node.
    pub fn from_node(node: &NodeRecord) -> Self {
        let sample_values = node
            .properties
            .get("sample_values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self {
            name: node.attr_str("name").unwrap_or(&node.key).to_string(),
            data_type: node.attr_str("data_type").map(str::to_string),
            sample_values,
        }
    }
}

/// Sampled text content of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobSample {
    pub path: String,
    pub content: String,
}

impl BlobSample {
    /// Last path segment; what the name detector sees.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// One (category, confidence, severity) result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: Category,
    pub confidence: f64,
    pub severity: Severity,
    /// The detector that produced the winning confidence.
    pub detector: DetectorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    /// Sorted by category.
    pub findings: Vec<Finding>,
    pub detector_errors: Vec<DetectorError>,
}

impl ClassificationOutcome {
    pub fn is_sensitive(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn finding(&self, category: Category) -> Option<&Finding> {
        self.findings.iter().find(|f| f.category == category)
    }
}

/// Stateless classifier over shared tables. Clone is cheap.
#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    tables: Arc<ClassificationTables>,
}

impl ClassificationEngine {
    pub fn new(tables: Arc<ClassificationTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ClassificationTables {
        &self.tables
    }

    /// Classify a column from its name and up to `max_samples` values.
    pub fn classify_column(&self, column: &ColumnDescriptor) -> ClassificationOutcome {
        let limit = column.sample_values.len().min(self.tables.max_samples());
        let input = ScanInput {
            name: &column.name,
            samples: &column.sample_values[..limit],
            mode: MatchMode::WholeValue,
        };
        self.classify(&input)
    }

    /// Classify file content line by line; patterns match anywhere in a line.
    pub fn classify_blob(&self, blob: &BlobSample) -> ClassificationOutcome {
        let lines: Vec<Value> = blob
            .content
            .lines()
            .map(|line| Value::String(line.to_string()))
            .collect();
        let input = ScanInput {
            name: blob.file_name(),
            samples: &lines,
            mode: MatchMode::Anywhere,
        };
        self.classify(&input)
    }

    fn classify(&self, input: &ScanInput<'_>) -> ClassificationOutcome {
        let tables = self.tables.as_ref();
        let mut outcome = ClassificationOutcome::default();
        let mut signals: Vec<Signal> = detectors::name_detector(tables, input);

        for result in [
            detectors::pattern_detector(tables, input),
            detectors::shape_detector(tables, input),
        ] {
            match result {
                Ok(found) => signals.extend(found),
                Err(e) => {
                    tracing::warn!(asset = %input.name, error = %e, "Detector failed");
                    outcome.detector_errors.push(e);
                }
            }
        }

        // Max per category; on ties the earlier detector keeps it.
        let mut best: BTreeMap<Category, Signal> = BTreeMap::new();
        for signal in signals {
            let entry = best.entry(signal.category).or_insert(signal);
            if signal.confidence > entry.confidence {
                *entry = signal;
            }
        }

        outcome.findings = best
            .into_values()
            .filter(|s| s.confidence > tables.min_confidence())
            .map(|s| Finding {
                category: s.category,
                confidence: s.confidence,
                severity: tables.severity(s.category),
                detector: s.detector,
            })
            .collect();
        outcome
    }
}
