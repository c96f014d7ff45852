//! estate-graph: embedded property-graph store for the estate metadata graph.
//!
//! This crate is the single mutation point for the graph. Every write goes
//! through a [`WriteTxn`], admitted one at a time, and is checked against the
//! [`SchemaRegistry`] the store was opened with. Reads are lazy streams that
//! may run alongside each other and alongside the writer.

pub mod migrations;
pub mod mutations;
pub mod queries;
pub mod schema;
pub mod store;

pub use mutations::{merge_properties, NodeRef};
pub use queries::{EdgeRecord, GraphStats, NodePattern, NodeRecord};
pub use schema::{AttrType, SchemaBuilder, SchemaRegistry};
pub use store::{GraphError, GraphStore, WriteTxn};
