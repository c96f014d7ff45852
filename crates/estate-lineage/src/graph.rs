//! In-memory lineage graph.
//!
//! Nodes get dense indices; edges are kept as forward and reverse adjacency
//! lists so downstream and upstream walks cost the same.

use std::collections::HashMap;

use estate_core::{EdgeKind, NodeKey};
use estate_graph::{EdgeRecord, NodeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineageEdge {
    pub kind: EdgeKind,
    /// Index of the node at the other end.
    pub node: usize,
}

pub struct LineageGraph {
    pub nodes: Vec<NodeRecord>,
    /// `downstream[i]`: edges leaving node `i`.
    pub downstream: Vec<Vec<LineageEdge>>,
    /// `upstream[i]`: edges arriving at node `i`, pointing back at their source.
    pub upstream: Vec<Vec<LineageEdge>>,
    pub node_index: HashMap<NodeKey, usize>,
}

impl LineageGraph {
    /// Build from fetched records. Edges whose endpoints are missing from
    /// `nodes` are dropped.
    pub fn from_subgraph(nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>) -> Self {
        let node_index: HashMap<NodeKey, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.node_key(), i))
            .collect();

        let mut downstream = vec![Vec::new(); nodes.len()];
        let mut upstream = vec![Vec::new(); nodes.len()];

        for edge in &edges {
            let (Some(&src), Some(&tgt)) =
                (node_index.get(&edge.source), node_index.get(&edge.target))
            else {
                continue;
            };
            downstream[src].push(LineageEdge {
                kind: edge.kind,
                node: tgt,
            });
            upstream[tgt].push(LineageEdge {
                kind: edge.kind,
                node: src,
            });
        }

        Self {
            nodes,
            downstream,
            upstream,
            node_index,
        }
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.node_index.get(key).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.downstream.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use estate_core::Properties;

    pub(crate) fn node(label: &str, key: &str) -> NodeRecord {
        NodeRecord {
            id: estate_core::node_id(label, key).to_string(),
            label: label.to_string(),
            key: key.to_string(),
            properties: Properties::new(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    pub(crate) fn edge(kind: EdgeKind, from: &NodeRecord, to: &NodeRecord) -> EdgeRecord {
        EdgeRecord {
            kind,
            source: from.node_key(),
            target: to.node_key(),
            properties: Properties::new(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    /// Table -> Pipeline -> Dataset -> Report, plus Dataset -> Report2.
    pub(crate) fn chain() -> LineageGraph {
        let t = node("Table", "sql01/sales/dbo.orders");
        let p = node("Pipeline", "adf/load_orders");
        let d = node("Dataset", "ds-orders");
        let r = node("Report", "rep-sales");
        let r2 = node("Report", "rep-ops");
        let edges = vec![
            edge(EdgeKind::Feeds, &t, &p),
            edge(EdgeKind::Feeds, &p, &d),
            edge(EdgeKind::Feeds, &d, &r),
            edge(EdgeKind::Feeds, &d, &r2),
        ];
        LineageGraph::from_subgraph(vec![t, p, d, r, r2], edges)
    }

    #[test]
    fn test_adjacency_both_directions() {
        let graph = chain();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.downstream[2].len(), 2);
        assert_eq!(graph.upstream[2], vec![LineageEdge { kind: EdgeKind::Feeds, node: 1 }]);
        assert!(graph.upstream[0].is_empty());
    }

    #[test]
    fn test_edge_with_missing_node_ignored() {
        let a = node("Table", "a");
        let b = node("Pipeline", "b");
        let graph =
            LineageGraph::from_subgraph(vec![a.clone()], vec![edge(EdgeKind::Feeds, &a, &b)]);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.index_of(&a.node_key()), Some(0));
        assert_eq!(graph.index_of(&b.node_key()), None);
    }
}
