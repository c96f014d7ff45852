//! estate-lineage: lineage queries over the estate metadata graph.
//!
//! Loads the `FEEDS` / `REFERENCES` subgraph from the store into memory and
//! answers path, impact and source questions on it.

pub mod algorithms;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod impact;

pub use error::{LineageError, Result};
pub use graph::LineageGraph;
pub use impact::{Direction, ImpactResult, ReachableAsset};

use estate_core::NodeKey;
use estate_graph::{GraphStore, NodeRecord};

/// Where a requested node sits relative to the lineage graph.
enum Located {
    InGraph(usize),
    /// Stored, but no lineage edge touches it.
    Isolated(NodeRecord),
}

pub struct LineageEngine {
    store: GraphStore,
}

impl LineageEngine {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    pub async fn load_graph(&self) -> Result<LineageGraph> {
        let subgraph = fetch::fetch_lineage_subgraph(&self.store).await?;
        let graph = LineageGraph::from_subgraph(subgraph.nodes, subgraph.edges);
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built lineage graph"
        );
        Ok(graph)
    }

    /// Fewest-hop lineage path from `from` to `to`, endpoints included.
    /// `None` when `to` is not downstream of `from`.
    pub async fn shortest_path(
        &self,
        from: &NodeKey,
        to: &NodeKey,
    ) -> Result<Option<Vec<NodeRecord>>> {
        let graph = self.load_graph().await?;
        let located = (self.locate(&graph, from).await?, self.locate(&graph, to).await?);
        let (source, target) = match located {
            (Located::InGraph(s), Located::InGraph(t)) => (s, t),
            (Located::Isolated(node), _) if from == to => return Ok(Some(vec![node])),
            _ => return Ok(None),
        };

        let path = algorithms::shortest_path(&graph, source, target);
        Ok(path.map(|indices| to_records(&graph, &indices)))
    }

    /// Every simple lineage path from `from` to `to`, shortest first.
    pub async fn enumerate_paths(
        &self,
        from: &NodeKey,
        to: &NodeKey,
        max_depth: usize,
        max_paths: usize,
    ) -> Result<Vec<Vec<NodeRecord>>> {
        let graph = self.load_graph().await?;
        let located = (self.locate(&graph, from).await?, self.locate(&graph, to).await?);
        let (source, target) = match located {
            (Located::InGraph(s), Located::InGraph(t)) => (s, t),
            (Located::Isolated(node), _) if from == to => return Ok(vec![vec![node]]),
            _ => return Ok(Vec::new()),
        };

        Ok(
            algorithms::enumerate_paths(&graph, source, target, max_depth, max_paths)
                .iter()
                .map(|indices| to_records(&graph, indices))
                .collect(),
        )
    }

    /// Everything `from` feeds, directly or transitively.
    pub async fn downstream_impact(&self, from: &NodeKey, max_hops: usize) -> Result<ImpactResult> {
        self.reach(from, Direction::Downstream, max_hops).await
    }

    /// Everything that feeds `to`, directly or transitively.
    pub async fn upstream_sources(&self, to: &NodeKey, max_hops: usize) -> Result<ImpactResult> {
        self.reach(to, Direction::Upstream, max_hops).await
    }

    async fn reach(
        &self,
        origin: &NodeKey,
        direction: Direction,
        max_hops: usize,
    ) -> Result<ImpactResult> {
        let graph = self.load_graph().await?;
        let result = match self.locate(&graph, origin).await? {
            Located::InGraph(index) => impact::reachable(&graph, index, direction, max_hops),
            Located::Isolated(_) => ImpactResult::empty(origin.clone(), direction, max_hops),
        };
        tracing::info!(
            origin = %origin,
            direction = ?direction,
            reachable = result.total(),
            "Lineage reach computed"
        );
        Ok(result)
    }

    async fn locate(&self, graph: &LineageGraph, key: &NodeKey) -> Result<Located> {
        if let Some(index) = graph.index_of(key) {
            return Ok(Located::InGraph(index));
        }
        match self.store.get_node(&key.label, &key.key).await? {
            Some(node) => Ok(Located::Isolated(node)),
            None => Err(LineageError::NodeNotFound {
                node: key.to_string(),
            }),
        }
    }
}

fn to_records(graph: &LineageGraph, indices: &[usize]) -> Vec<NodeRecord> {
    indices.iter().map(|&i| graph.nodes[i].clone()).collect()
}
