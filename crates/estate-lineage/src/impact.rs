//! Reachability with hop distance: what an asset feeds (impact) or what it
//! is fed by (sources).

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use estate_core::{EdgeKind, NodeKey};

use crate::graph::LineageGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Downstream,
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachableAsset {
    pub node: NodeKey,
    pub name: String,
    pub hops: usize,
    /// Kind of the edge by which the asset was first reached.
    pub via: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub origin: NodeKey,
    pub direction: Direction,
    pub max_hops: usize,
    /// Nearest first, then by key.
    pub assets: Vec<ReachableAsset>,
    pub by_label: BTreeMap<String, usize>,
}

impl ImpactResult {
    pub fn empty(origin: NodeKey, direction: Direction, max_hops: usize) -> Self {
        Self {
            origin,
            direction,
            max_hops,
            assets: Vec::new(),
            by_label: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.assets.len()
    }
}

/// BFS from `origin` up to `max_hops` edges away.
pub fn reachable(
    graph: &LineageGraph,
    origin: usize,
    direction: Direction,
    max_hops: usize,
) -> ImpactResult {
    let adjacency = match direction {
        Direction::Downstream => &graph.downstream,
        Direction::Upstream => &graph.upstream,
    };

    let mut result = ImpactResult::empty(graph.nodes[origin].node_key(), direction, max_hops);
    let mut visited = vec![false; graph.node_count()];
    visited[origin] = true;

    let mut queue = VecDeque::from([(origin, 0usize)]);
    while let Some((node, hops)) = queue.pop_front() {
        if hops >= max_hops {
            continue;
        }
        for edge in &adjacency[node] {
            if visited[edge.node] {
                continue;
            }
            visited[edge.node] = true;

            let record = &graph.nodes[edge.node];
            *result.by_label.entry(record.label.clone()).or_insert(0) += 1;
            result.assets.push(ReachableAsset {
                node: record.node_key(),
                name: record.display_name().to_string(),
                hops: hops + 1,
                via: edge.kind,
            });
            queue.push_back((edge.node, hops + 1));
        }
    }

    result
        .assets
        .sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.node.cmp(&b.node)));
    result
}
