//! Error types for the estate-lineage crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Graph error: {0}")]
    Graph(#[from] estate_graph::GraphError),

    #[error("Node not in lineage graph: {node}")]
    NodeNotFound { node: String },
}

pub type Result<T> = std::result::Result<T, LineageError>;
