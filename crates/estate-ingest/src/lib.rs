//! estate-ingest: batch ingestion coordinator for the estate metadata graph.
//!
//! Takes the fully fetched output of one collector, derives node identity
//! with the shared natural-key functions, and applies the resulting
//! mutations in fixed-size chunks, one write transaction each. Per-record
//! problems are reported, not fatal; chunk failures are retried, then
//! reported with the keys of everything the chunk would have written.

pub mod coordinator;
pub mod error;
pub mod identity;
pub mod journal;
pub mod plan;
pub mod summary;

pub use coordinator::{ChunkProgress, IngestionCoordinator};
pub use error::{IngestError, Result};
pub use plan::{IngestPlan, Mutation};
pub use summary::{ChunkFailure, IngestionSummary, RecordError, RecordErrorKind};
