//! Error types for the estate-ingest crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Graph error: {0}")]
    Graph(#[from] estate_graph::GraphError),

    #[error("Record error: {0}")]
    Record(#[from] estate_core::EstateError),

    #[error("Journal error: {0}")]
    Journal(#[from] estate_journal::JournalError),

    #[error("Invalid batch file {path}: {reason}")]
    BatchFile { path: String, reason: String },

    #[error("Ingestion task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
