//! Path algorithms over the lineage graph: BFS shortest path and
//! breadth-first all-paths enumeration.

use std::collections::{HashSet, VecDeque};

use crate::graph::LineageGraph;

/// Fewest-hop downstream path from `source` to `target` as node indices,
/// both ends included. Neighbors are visited in adjacency order, so ties
/// resolve the same way on every run.
pub fn shortest_path(graph: &LineageGraph, source: usize, target: usize) -> Option<Vec<usize>> {
    if source == target {
        return Some(vec![source]);
    }

    let mut prev: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut visited = vec![false; graph.node_count()];
    visited[source] = true;

    let mut queue = VecDeque::from([source]);
    while let Some(node) = queue.pop_front() {
        for edge in &graph.downstream[node] {
            if visited[edge.node] {
                continue;
            }
            visited[edge.node] = true;
            prev[edge.node] = Some(node);
            if edge.node == target {
                return Some(reconstruct(&prev, source, target));
            }
            queue.push_back(edge.node);
        }
    }
    None
}

fn reconstruct(prev: &[Option<usize>], source: usize, target: usize) -> Vec<usize> {
    let mut path = vec![target];
    let mut current = target;
    while let Some(parent) = prev[current] {
        path.push(parent);
        current = parent;
        if current == source {
            break;
        }
    }
    path.reverse();
    path
}

/// Every simple downstream path from `source` to `target` with at most
/// `max_depth` edges, capped at `max_paths`. Shortest first.
///
/// Partial paths are expanded breadth-first, so paths are found in order of
/// length and the cap always keeps the shortest ones. Equal-length paths
/// follow adjacency order.
pub fn enumerate_paths(
    graph: &LineageGraph,
    source: usize,
    target: usize,
    max_depth: usize,
    max_paths: usize,
) -> Vec<Vec<usize>> {
    let mut paths = Vec::new();
    if source == target {
        paths.push(vec![source]);
        return paths;
    }

    let mut queue = VecDeque::from([PathState {
        node: source,
        path: vec![source],
        visited: HashSet::from([source]),
    }]);

    while let Some(state) = queue.pop_front() {
        if paths.len() >= max_paths {
            break;
        }
        if state.node == target {
            paths.push(state.path);
            continue;
        }
        if state.path.len() > max_depth {
            continue;
        }

        for edge in &graph.downstream[state.node] {
            if state.visited.contains(&edge.node) {
                continue;
            }
            let mut visited = state.visited.clone();
            visited.insert(edge.node);
            let mut path = state.path.clone();
            path.push(edge.node);
            queue.push_back(PathState {
                node: edge.node,
                path,
                visited,
            });
        }
    }

    paths
}

/// A simple path under construction.
struct PathState {
    node: usize,
    path: Vec<usize>,
    visited: HashSet<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{chain, edge, node};
    use estate_core::EdgeKind;

    #[test]
    fn test_shortest_path_follows_feeds_chain() {
        let graph = chain();
        assert_eq!(shortest_path(&graph, 0, 3), Some(vec![0, 1, 2, 3]));
        assert_eq!(shortest_path(&graph, 1, 4), Some(vec![1, 2, 4]));
    }

    #[test]
    fn test_shortest_path_is_directed() {
        let graph = chain();
        assert_eq!(shortest_path(&graph, 3, 0), None);
        assert_eq!(shortest_path(&graph, 3, 4), None);
    }

    #[test]
    fn test_same_node_path() {
        let graph = chain();
        assert_eq!(shortest_path(&graph, 2, 2), Some(vec![2]));
        assert_eq!(enumerate_paths(&graph, 2, 2, 5, 5), vec![vec![2]]);
    }

    #[test]
    fn test_enumerate_paths_with_shortcut_and_cycle() {
        let t = node("Table", "t");
        let p = node("Pipeline", "p");
        let d = node("Dataset", "d");
        let r = node("Report", "r");
        let edges = vec![
            edge(EdgeKind::Feeds, &t, &p),
            edge(EdgeKind::Feeds, &p, &d),
            edge(EdgeKind::Feeds, &d, &r),
            edge(EdgeKind::Feeds, &p, &r),
            // cycle back to the source
            edge(EdgeKind::Feeds, &d, &t),
        ];
        let graph = LineageGraph::from_subgraph(vec![t, p, d, r], edges);

        let paths = enumerate_paths(&graph, 0, 3, 10, 10);
        assert_eq!(paths, vec![vec![0, 1, 3], vec![0, 1, 2, 3]]);

        let capped = enumerate_paths(&graph, 0, 3, 2, 10);
        assert_eq!(capped, vec![vec![0, 1, 3]]);

        // the cap keeps the shortest path even though the longer one
        // comes first in adjacency order
        let limited = enumerate_paths(&graph, 0, 3, 10, 1);
        assert_eq!(limited, vec![vec![0, 1, 3]]);
    }
}
