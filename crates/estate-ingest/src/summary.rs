//! Structured result of ingesting one batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a single record (or one edge it implied) was skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordErrorKind {
    SchemaViolation,
    UnknownEndpoint,
}

/// A record skipped while the rest of its chunk committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordError {
    /// Position of the record in the collector batch (0-based).
    pub record_index: usize,
    /// `Label:key` of the node, or a description of the edge.
    pub entity: String,
    pub kind: RecordErrorKind,
    pub message: String,
}

/// A chunk that could not be committed after all retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    /// Every entity the chunk would have written.
    pub entity_keys: Vec<String>,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of one [`crate::IngestionCoordinator::ingest`] call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionSummary {
    pub batch_id: Uuid,
    pub source: String,
    pub scanned_at: DateTime<Utc>,
    pub records_received: usize,
    pub chunks_total: usize,
    pub chunks_committed: usize,
    pub chunks_failed: usize,
    pub nodes_upserted: usize,
    pub edges_upserted: usize,
    /// Skipped records plus every mutation of a failed chunk.
    pub records_failed: usize,
    pub retries: u32,
    pub record_errors: Vec<RecordError>,
    pub chunk_failures: Vec<ChunkFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IngestionSummary {
    pub fn new(batch_id: Uuid, source: String, scanned_at: DateTime<Utc>, records: usize) -> Self {
        Self {
            batch_id,
            source,
            scanned_at,
            records_received: records,
            chunks_total: 0,
            chunks_committed: 0,
            chunks_failed: 0,
            nodes_upserted: 0,
            edges_upserted: 0,
            records_failed: 0,
            retries: 0,
            record_errors: Vec::new(),
            chunk_failures: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        }
    }

    pub fn record_error(&mut self, error: RecordError) {
        tracing::warn!(
            record = error.record_index,
            entity = %error.entity,
            kind = ?error.kind,
            error = %error.message,
            "Record skipped"
        );
        self.records_failed += 1;
        self.record_errors.push(error);
    }

    /// Mutations successfully written.
    pub fn succeeded(&self) -> usize {
        self.nodes_upserted + self.edges_upserted
    }

    /// Nothing skipped, nothing failed, not cancelled.
    pub fn is_clean(&self) -> bool {
        self.records_failed == 0 && self.chunks_failed == 0 && !self.cancelled
    }

    /// Keys of every entity that did not make it into the graph.
    pub fn failed_entities(&self) -> Vec<&str> {
        self.record_errors
            .iter()
            .map(|e| e.entity.as_str())
            .chain(
                self.chunk_failures
                    .iter()
                    .flat_map(|f| f.entity_keys.iter().map(String::as_str)),
            )
            .collect()
    }
}
