//! Error types for the estate-classify crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detectors::DetectorKind;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Graph error: {0}")]
    Graph(#[from] estate_graph::GraphError),

    #[error("{0}")]
    Estate(#[from] estate_core::EstateError),

    #[error("Invalid pattern {label}: {reason}")]
    InvalidPattern { label: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

/// A detector that could not process a target. Caught per detector: the
/// other detectors of the same target still run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectorError {
    #[error("{detector} detector: sample {index} is {found}, expected a scalar")]
    UnsupportedValue {
        detector: DetectorKind,
        index: usize,
        found: String,
    },
}
