//! estate-core: Record model, natural keys, configuration, and error handling
//! for the estate metadata graph.
//!
//! This crate provides the foundational types shared by every estate component:
//! - Node kinds (Subscription, Table, Column, Blob, etc.) and edge kinds
//! - Typed collector records and the batch envelope they travel in
//! - The natural-key function for every node kind
//! - Sensitivity categories and severities used by classification
//! - Layered configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod keys;
pub mod sensitivity;
pub mod types;

pub use config::EstateConfig;
pub use error::{EstateError, Result};
pub use keys::{node_id, NaturalKey};
pub use sensitivity::{Category, Severity};
pub use types::{
    CollectorBatch, CollectorSource, EdgeKind, FormatCategory, GenericNode, NodeKey, NodeKind,
    Properties, Record, Relationship,
};
