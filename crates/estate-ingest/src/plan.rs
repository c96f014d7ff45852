//! Batch planning: records → ordered graph mutations.
//!
//! Every node mutation of a batch precedes every edge mutation, so an edge
//! whose endpoints appear anywhere in the same batch always resolves.

use estate_core::types::Relationship;
use estate_core::{CollectorBatch, EdgeKind, NodeKey, NodeKind, Properties, Record};
use serde::{Deserialize, Serialize};

use crate::identity;
use crate::summary::{RecordError, RecordErrorKind};

/// A node upsert derived from one record.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMutation {
    pub record_index: usize,
    pub node: NodeKey,
    pub attributes: Properties,
}

/// An edge upsert, explicit or implied by a record's reference fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMutation {
    pub record_index: usize,
    pub kind: EdgeKind,
    pub source: NodeKey,
    pub target: NodeKey,
    pub attributes: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Node(NodeMutation),
    Edge(EdgeMutation),
}

impl Mutation {
    pub fn record_index(&self) -> usize {
        match self {
            Mutation::Node(n) => n.record_index,
            Mutation::Edge(e) => e.record_index,
        }
    }

    /// Printable identity, used in error reports.
    pub fn entity_key(&self) -> String {
        match self {
            Mutation::Node(n) => n.node.to_string(),
            Mutation::Edge(e) => format!("{} {} -> {}", e.kind, e.source, e.target),
        }
    }
}

/// The mutations for one batch plus the records that could not be planned.
#[derive(Debug, Default)]
pub struct IngestPlan {
    pub nodes: Vec<NodeMutation>,
    pub edges: Vec<EdgeMutation>,
    pub rejected: Vec<RecordError>,
}

/// Counts for logging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanCounts {
    pub nodes: usize,
    pub edges: usize,
    pub rejected: usize,
}

impl IngestPlan {
    pub fn from_batch(batch: &CollectorBatch) -> Self {
        let mut plan = IngestPlan::default();
        for (index, record) in batch.records.iter().enumerate() {
            if let Err(e) = plan.add_record(index, record) {
                plan.rejected.push(RecordError {
                    record_index: index,
                    entity: record_entity(record),
                    kind: RecordErrorKind::SchemaViolation,
                    message: e.to_string(),
                });
            }
        }
        plan
    }

    fn add_record(&mut self, index: usize, record: &Record) -> estate_core::Result<()> {
        if let Record::Relationship(rel) = record {
            return self.add_relationship(index, rel);
        }

        let Some(node) = identity::node_key(record)? else {
            return Ok(());
        };
        let attributes = identity::node_attributes(record)?;
        let implied = implied_edges(record, &node);

        self.nodes.push(NodeMutation {
            record_index: index,
            node,
            attributes,
        });
        for (kind, source, target) in implied {
            self.edges.push(EdgeMutation {
                record_index: index,
                kind,
                source,
                target,
                attributes: Properties::new(),
            });
        }
        Ok(())
    }

    fn add_relationship(&mut self, index: usize, rel: &Relationship) -> estate_core::Result<()> {
        identity::check_relationship_kind(rel.kind)?;
        identity::checked_key(&rel.from.label, &rel.from.key)?;
        identity::checked_key(&rel.to.label, &rel.to.key)?;
        self.edges.push(EdgeMutation {
            record_index: index,
            kind: rel.kind,
            source: rel.from.clone(),
            target: rel.to.clone(),
            attributes: rel.properties.clone(),
        });
        Ok(())
    }

    /// All mutations in apply order: nodes, then edges, each in encounter order.
    pub fn into_mutations(self) -> (Vec<Mutation>, Vec<RecordError>) {
        let mut mutations = Vec::with_capacity(self.nodes.len() + self.edges.len());
        mutations.extend(self.nodes.into_iter().map(Mutation::Node));
        mutations.extend(self.edges.into_iter().map(Mutation::Edge));
        (mutations, self.rejected)
    }

    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            rejected: self.rejected.len(),
        }
    }
}

/// Printable identity of a record that could not be planned.
fn record_entity(record: &Record) -> String {
    match record {
        Record::Relationship(rel) => format!("{} {} -> {}", rel.kind, rel.from, rel.to),
        Record::Generic(g) => format!("{}:{}", g.label, g.key),
        other => other.label().unwrap_or_default().to_string(),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Edges implied by a record's reference fields, as (kind, source, target).
fn implied_edges(record: &Record, node: &NodeKey) -> Vec<(EdgeKind, NodeKey, NodeKey)> {
    let mut edges = Vec::new();
    match record {
        Record::Resource(r) => {
            if let Some(sub) = non_empty(&r.subscription_id) {
                edges.push((
                    EdgeKind::Contains,
                    NodeKey::new(NodeKind::Subscription, sub),
                    node.clone(),
                ));
            }
        }
        Record::Dataset(d) => {
            if let Some(ws) = non_empty(&d.workspace_id) {
                edges.push((
                    EdgeKind::Contains,
                    NodeKey::new(NodeKind::Workspace, ws),
                    node.clone(),
                ));
            }
        }
        Record::Report(r) => {
            if let Some(ws) = non_empty(&r.workspace_id) {
                edges.push((
                    EdgeKind::Contains,
                    NodeKey::new(NodeKind::Workspace, ws),
                    node.clone(),
                ));
            }
            if let Some(ds) = non_empty(&r.dataset_id) {
                edges.push((
                    EdgeKind::Feeds,
                    NodeKey::new(NodeKind::Dataset, ds),
                    node.clone(),
                ));
            }
        }
        Record::Column(c) => {
            edges.push((
                EdgeKind::HasColumn,
                NodeKey::new(NodeKind::Table, c.table_key.clone()),
                node.clone(),
            ));
        }
        Record::Blob(b) => {
            edges.push((
                EdgeKind::Contains,
                NodeKey::new(NodeKind::Container, b.container_key.clone()),
                node.clone(),
            ));
        }
        Record::User(u) => {
            for group in u.member_of.iter().filter(|g| !g.trim().is_empty()) {
                edges.push((
                    EdgeKind::MemberOf,
                    node.clone(),
                    NodeKey::new(NodeKind::Group, group.clone()),
                ));
            }
        }
        _ => {}
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use estate_core::types::{Column, Report, Table, User};
    use estate_core::CollectorSource;

    fn column(table_key: &str, name: &str) -> Record {
        Record::Column(Column {
            table_key: table_key.to_string(),
            name: name.to_string(),
            data_type: Some("varchar".to_string()),
            max_length: None,
            is_nullable: None,
            is_identity: None,
            ordinal: None,
            sample_values: vec![],
        })
    }

    #[test]
    fn test_nodes_precede_edges() {
        let batch = CollectorBatch::new(
            CollectorSource::SqlSchema,
            vec![
                column("s/d/dbo.t", "id"),
                Record::Table(Table {
                    server: "s".to_string(),
                    database: "d".to_string(),
                    schema: "dbo".to_string(),
                    name: "t".to_string(),
                    object_id: None,
                    row_count: None,
                }),
            ],
        );

        let plan = IngestPlan::from_batch(&batch);
        assert_eq!(
            plan.counts(),
            PlanCounts {
                nodes: 2,
                edges: 1,
                rejected: 0
            }
        );

        let (mutations, _) = plan.into_mutations();
        assert!(matches!(mutations[0], Mutation::Node(_)));
        assert!(matches!(mutations[1], Mutation::Node(_)));
        match &mutations[2] {
            Mutation::Edge(e) => {
                assert_eq!(e.kind, EdgeKind::HasColumn);
                assert_eq!(e.source.to_string(), "Table:s/d/dbo.t");
                assert_eq!(e.target.to_string(), "Column:s/d/dbo.t/id");
                assert_eq!(e.record_index, 0);
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_implied_report_and_membership_edges() {
        let batch = CollectorBatch::new(
            CollectorSource::PowerBi,
            vec![
                Record::Report(Report {
                    report_id: "rep-1".to_string(),
                    name: None,
                    workspace_id: Some("ws-1".to_string()),
                    dataset_id: Some("ds-1".to_string()),
                    web_url: None,
                }),
                Record::User(User {
                    user_id: "u-1".to_string(),
                    display_name: None,
                    mail: None,
                    upn: None,
                    member_of: vec!["g-1".to_string(), "g-2".to_string()],
                }),
            ],
        );

        let plan = IngestPlan::from_batch(&batch);
        let kinds: Vec<_> = plan.edges.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::Contains,
                EdgeKind::Feeds,
                EdgeKind::MemberOf,
                EdgeKind::MemberOf
            ]
        );
    }

    #[test]
    fn test_collector_classification_records_are_rejected() {
        let column_key = NodeKey::new(NodeKind::Column, "s/d/dbo.t/cpf");
        let classification =
            NodeKey::new(NodeKind::Classification, "Column:s/d/dbo.t/cpf#NationalID");
        let batch = CollectorBatch::new(
            CollectorSource::SqlSchema,
            vec![
                Record::Generic(estate_core::GenericNode {
                    label: "Classification".to_string(),
                    key: classification.key.clone(),
                    properties: Properties::new(),
                }),
                Record::Relationship(Relationship::new(
                    EdgeKind::ClassifiedAs,
                    column_key,
                    classification,
                )),
            ],
        );

        let plan = IngestPlan::from_batch(&batch);
        assert!(plan.nodes.is_empty());
        assert!(plan.edges.is_empty());
        assert_eq!(plan.rejected.len(), 2);
        assert!(plan
            .rejected
            .iter()
            .all(|e| e.kind == RecordErrorKind::SchemaViolation));
        assert!(plan.rejected[1].entity.starts_with("CLASSIFIED_AS Column:"));
    }

    #[test]
    fn test_unkeyable_record_is_rejected_not_dropped() {
        let batch = CollectorBatch::new(
            CollectorSource::SqlSchema,
            vec![column("s/d/dbo.t", "ok"), column("", "orphan")],
        );
        let plan = IngestPlan::from_batch(&batch);
        assert_eq!(plan.nodes.len(), 1);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].record_index, 1);
        assert_eq!(plan.rejected[0].kind, RecordErrorKind::SchemaViolation);
    }
}
