//! Chunked, transactional application of collector batches.
//!
//! Each chunk runs in one write transaction. Records that fail validation
//! are skipped and reported while their chunk commits; a store failure rolls
//! the whole chunk back and retries it with exponential backoff.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use estate_core::config::IngestConfig;
use estate_core::CollectorBatch;
use estate_graph::{GraphError, GraphStore};

use crate::error::{IngestError, Result};
use crate::plan::{IngestPlan, Mutation};
use crate::summary::{ChunkFailure, IngestionSummary, RecordError, RecordErrorKind};

/// Delay before retry number `retry` (0-based): `base_ms * 2^retry`.
pub fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 1u64 << retry.min(20);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// What one committed chunk wrote.
#[derive(Debug, Default)]
struct ChunkOutcome {
    nodes: usize,
    edges: usize,
    skipped: Vec<RecordError>,
}

/// Reported once per chunk, after it committed or failed for good.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkProgress {
    pub batch_id: Uuid,
    pub chunk_index: usize,
    pub chunks_total: usize,
    pub committed: bool,
}

type ChunkObserver = Arc<dyn Fn(&ChunkProgress) + Send + Sync>;

/// Applies collector batches to the graph store.
///
/// Clone is cheap; clones share the store.
#[derive(Clone)]
pub struct IngestionCoordinator {
    store: GraphStore,
    config: IngestConfig,
    observer: Option<ChunkObserver>,
}

impl IngestionCoordinator {
    pub fn new(store: GraphStore, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            observer: None,
        }
    }

    /// Call `observer` after every settled chunk, before the next
    /// cancellation check.
    pub fn on_chunk<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ChunkProgress) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Ingest one batch. Cancellation is observed between chunks only.
    pub async fn ingest(
        &self,
        batch: &CollectorBatch,
        cancel: &CancellationToken,
    ) -> IngestionSummary {
        let started = Instant::now();
        let mut summary = IngestionSummary::new(
            batch.batch_id,
            batch.source.to_string(),
            batch.scanned_at,
            batch.records.len(),
        );

        let plan = IngestPlan::from_batch(batch);
        let counts = plan.counts();
        let (mutations, rejected) = plan.into_mutations();
        for error in rejected {
            summary.record_error(error);
        }

        let chunk_size = self.config.chunk_size.max(1);
        summary.chunks_total = mutations.len().div_ceil(chunk_size);

        tracing::info!(
            batch_id = %batch.batch_id,
            source = %batch.source,
            records = batch.records.len(),
            nodes = counts.nodes,
            edges = counts.edges,
            chunks = summary.chunks_total,
            "Ingesting batch"
        );

        for (chunk_index, chunk) in mutations.chunks(chunk_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    chunk = chunk_index,
                    remaining = summary.chunks_total - chunk_index,
                    "Ingestion cancelled"
                );
                summary.cancelled = true;
                break;
            }
            let committed = self
                .run_chunk(chunk_index, chunk, batch.scanned_at, &mut summary)
                .await;
            if let Some(observer) = &self.observer {
                observer(&ChunkProgress {
                    batch_id: batch.batch_id,
                    chunk_index,
                    chunks_total: summary.chunks_total,
                    committed,
                });
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            batch_id = %batch.batch_id,
            source = %summary.source,
            committed = summary.chunks_committed,
            failed = summary.chunks_failed,
            nodes = summary.nodes_upserted,
            edges = summary.edges_upserted,
            records_failed = summary.records_failed,
            retries = summary.retries,
            duration_ms = summary.duration_ms,
            "Batch ingested"
        );
        summary
    }

    /// Validate, then apply one chunk with retries. Returns whether it
    /// committed.
    async fn run_chunk(
        &self,
        chunk_index: usize,
        chunk: &[Mutation],
        seen_at: DateTime<Utc>,
        summary: &mut IngestionSummary,
    ) -> bool {
        let mut valid = Vec::with_capacity(chunk.len());
        for mutation in chunk {
            match self.validate(mutation) {
                Ok(()) => valid.push(mutation),
                Err(e) => summary.record_error(RecordError {
                    record_index: mutation.record_index(),
                    entity: mutation.entity_key(),
                    kind: RecordErrorKind::SchemaViolation,
                    message: e.to_string(),
                }),
            }
        }

        let mut attempt: u32 = 0;
        loop {
            match self.apply(&valid, seen_at).await {
                Ok(outcome) => {
                    summary.chunks_committed += 1;
                    summary.nodes_upserted += outcome.nodes;
                    summary.edges_upserted += outcome.edges;
                    for error in outcome.skipped {
                        summary.record_error(error);
                    }
                    tracing::debug!(chunk = chunk_index, attempt, "Chunk committed");
                    return true;
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.backoff_base_ms, attempt);
                    attempt += 1;
                    summary.retries += 1;
                    tracing::warn!(
                        chunk = chunk_index,
                        retry = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Chunk rolled back, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let entity_keys: Vec<String> = valid.iter().map(|m| m.entity_key()).collect();
                    tracing::error!(
                        chunk = chunk_index,
                        attempts = attempt + 1,
                        entities = entity_keys.len(),
                        error = %e,
                        "Chunk failed"
                    );
                    summary.chunks_failed += 1;
                    summary.records_failed += entity_keys.len();
                    summary.chunk_failures.push(ChunkFailure {
                        chunk_index,
                        entity_keys,
                        attempts: attempt + 1,
                        error: e.to_string(),
                    });
                    return false;
                }
            }
        }
    }

    fn validate(&self, mutation: &Mutation) -> std::result::Result<(), GraphError> {
        match mutation {
            Mutation::Node(n) => self.store.validate_node(&n.node.label, &n.attributes),
            Mutation::Edge(e) => self.store.validate_edge(e.kind, &e.source, &e.target),
        }
    }

    /// One write transaction over the chunk. A missing edge endpoint skips
    /// that edge only; any other store error aborts (and rolls back) the chunk.
    async fn apply(
        &self,
        chunk: &[&Mutation],
        seen_at: DateTime<Utc>,
    ) -> std::result::Result<ChunkOutcome, GraphError> {
        let mut txn = self.store.begin_write().await?;
        let mut outcome = ChunkOutcome::default();

        for mutation in chunk {
            let result = match mutation {
                Mutation::Node(n) => txn
                    .upsert_node(&n.node.label, &n.node.key, &n.attributes, seen_at)
                    .await
                    .map(|_| outcome.nodes += 1),
                Mutation::Edge(e) => txn
                    .upsert_edge(e.kind, &e.source, &e.target, &e.attributes, seen_at)
                    .await
                    .map(|()| outcome.edges += 1),
            };

            match result {
                Ok(()) => {}
                Err(err @ GraphError::UnknownEndpoint { .. }) => outcome.skipped.push(RecordError {
                    record_index: mutation.record_index(),
                    entity: mutation.entity_key(),
                    kind: RecordErrorKind::UnknownEndpoint,
                    message: err.to_string(),
                }),
                Err(err @ GraphError::SchemaViolation { .. }) => outcome.skipped.push(RecordError {
                    record_index: mutation.record_index(),
                    entity: mutation.entity_key(),
                    kind: RecordErrorKind::SchemaViolation,
                    message: err.to_string(),
                }),
                Err(err) => return Err(err),
            }
        }

        txn.commit().await?;
        Ok(outcome)
    }

    /// Ingest several batches as concurrent tasks, at most
    /// `max_concurrent_batches` at a time. Writes stay serialized by the
    /// store.
    ///
    /// Every task is awaited; results are in input order, one per batch, so
    /// a failed task never hides its siblings' summaries.
    pub async fn ingest_all(
        &self,
        batches: Vec<CollectorBatch>,
        cancel: &CancellationToken,
    ) -> Vec<Result<IngestionSummary>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches.max(1)));
        let mut handles = Vec::with_capacity(batches.len());

        for batch in batches {
            let coordinator = self.clone();
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| IngestError::Task(e.to_string()))?;
                Ok::<_, IngestError>(coordinator.ingest(&batch, &cancel).await)
            }));
        }

        tracing::info!(batches = handles.len(), "Batch tasks started");

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(IngestError::Task(e.to_string())),
            };
            if let Err(e) = &result {
                tracing::error!(batch = index, error = %e, "Batch task failed");
            }
            results.push(result);
        }
        results
    }
}
