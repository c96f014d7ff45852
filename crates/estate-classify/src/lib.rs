//! estate-classify: sensitive-data classification for the estate graph.
//!
//! Three detectors (name keywords, value patterns, checksum/structure
//! validation) score a column or file sample per category; the engine keeps
//! the highest confidence per category and maps it to a fixed severity.
//! Findings are written back as `Classification` nodes linked to the asset.

pub mod detectors;
pub mod engine;
pub mod error;
pub mod journal;
pub mod report;
pub mod run;
pub mod tables;
pub mod validate;
pub mod writer;

pub use detectors::DetectorKind;
pub use engine::{
    BlobSample, ClassificationEngine, ClassificationOutcome, ColumnDescriptor, Finding,
};
pub use error::{ClassifyError, DetectorError, Result};
pub use report::ClassificationReport;
pub use run::{ClassificationRun, ClassificationRunSummary};
pub use tables::ClassificationTables;
pub use writer::ClassificationWriter;
