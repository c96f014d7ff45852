//! Loads the lineage subgraph: every `FEEDS` / `REFERENCES` edge and the
//! nodes at either end of one.

use std::collections::BTreeSet;

use futures_util::TryStreamExt;

use estate_core::{EdgeKind, NodeKey};
use estate_graph::{EdgeRecord, GraphStore, NodeRecord};

use crate::error::Result;

pub struct LineageSubgraph {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

pub async fn fetch_lineage_subgraph(store: &GraphStore) -> Result<LineageSubgraph> {
    let kinds: Vec<EdgeKind> = EdgeKind::ALL.into_iter().filter(EdgeKind::is_lineage).collect();
    let edges: Vec<EdgeRecord> = store.edges_of_kinds(&kinds).try_collect().await?;

    let endpoints: BTreeSet<NodeKey> = edges
        .iter()
        .flat_map(|e| [e.source.clone(), e.target.clone()])
        .collect();
    let labels: BTreeSet<&str> = endpoints.iter().map(|k| k.label.as_str()).collect();
    let labels: Vec<&str> = labels.into_iter().collect();

    let nodes: Vec<NodeRecord> = store
        .nodes_of_labels(&labels)
        .try_filter(|node| futures_util::future::ready(endpoints.contains(&node.node_key())))
        .try_collect()
        .await?;

    tracing::debug!(nodes = nodes.len(), edges = edges.len(), "Fetched lineage subgraph");
    Ok(LineageSubgraph { nodes, edges })
}
