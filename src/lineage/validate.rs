//! Structural checks over a built lineage graph.
//!
//! Findings are returned, never raised: a cycle or an orphan is something to
//! report, not a reason to stop.

use super::graph::{Edge, LineageGraph};
use crate::types::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{info, warn};

/// Node counts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub datasets: usize,
    pub fields: usize,
    pub jobs: usize,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Flow cycles, each starting at its lowest key.
    pub cycles: Vec<Vec<String>>,
    /// Nodes without any incoming or outgoing flow edge.
    pub orphan_nodes: BTreeSet<String>,
    /// Edges whose source or target is missing from the graph.
    pub dangling_edges: Vec<Edge>,
    pub node_count: usize,
    pub edge_count: usize,
    /// Longest shortest path (in edges) from a pure source to a pure sink;
    /// 0 when the flow graph has a cycle.
    pub max_depth: usize,
    pub kind_counts: KindCounts,
    /// Placeholder nodes (inferred or incomplete).
    pub inferred_nodes: BTreeSet<String>,
}

impl ValidationReport {
    /// No cycles and no dangling edges. Orphans alone do not make a graph unclean.
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty() && self.dangling_edges.is_empty()
    }

    /// Any finding at all, orphans included.
    pub fn has_findings(&self) -> bool {
        !self.is_clean() || !self.orphan_nodes.is_empty()
    }
}

/// Runs every structural check. Never mutates the graph.
pub fn validate(graph: &LineageGraph) -> ValidationReport {
    let cycles = find_cycles(graph);

    let orphan_nodes: BTreeSet<String> = graph
        .nodes()
        .filter(|n| {
            graph.incoming_flow(&n.key).next().is_none() && graph.outgoing_flow(&n.key).next().is_none()
        })
        .map(|n| n.key.clone())
        .collect();

    let dangling_edges: Vec<Edge> = graph
        .edges()
        .filter(|e| !graph.contains_node(&e.source) || !graph.contains_node(&e.target))
        .cloned()
        .collect();

    let max_depth = if cycles.is_empty() { longest_source_to_sink(graph) } else { 0 };

    let mut kind_counts = KindCounts::default();
    for node in graph.nodes() {
        match node.kind {
            NodeKind::Dataset => kind_counts.datasets += 1,
            NodeKind::Field => kind_counts.fields += 1,
            NodeKind::Job => kind_counts.jobs += 1,
        }
    }

    let inferred_nodes = graph
        .nodes()
        .filter(|n| n.is_inferred() || n.is_incomplete())
        .map(|n| n.key.clone())
        .collect();

    let report = ValidationReport {
        cycles,
        orphan_nodes,
        dangling_edges,
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        max_depth,
        kind_counts,
        inferred_nodes,
    };

    if !report.cycles.is_empty() {
        warn!(cycles = report.cycles.len(), "Lineage cycles detected");
    }
    info!(
        nodes = report.node_count,
        edges = report.edge_count,
        orphans = report.orphan_nodes.len(),
        max_depth = report.max_depth,
        "Lineage graph validated"
    );
    report
}

struct Frame<'a> {
    key: &'a str,
    neighbors: Vec<&'a str>,
    next: usize,
}

impl<'a> Frame<'a> {
    fn new(key: &'a str, neighbors: impl IntoIterator<Item = &'a str>) -> Self {
        let neighbors: BTreeSet<&str> = neighbors.into_iter().collect();
        Self {
            key,
            neighbors: neighbors.into_iter().collect(),
            next: 0,
        }
    }
}

/// Strongly connected components of the flow graph (Kosaraju, iterative).
/// Returns the component id of every node key.
fn flow_components(graph: &LineageGraph) -> HashMap<&str, usize> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut finished: Vec<&str> = Vec::with_capacity(graph.node_count());

    for root in graph.node_keys() {
        if !visited.insert(root) {
            continue;
        }
        let mut stack = vec![Frame::new(root, graph.outgoing_flow(root).map(|e| e.target.as_str()))];
        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.neighbors.len() {
                finished.push(frame.key);
                stack.pop();
                continue;
            }
            let next = frame.neighbors[frame.next];
            frame.next += 1;
            if visited.insert(next) {
                stack.push(Frame::new(next, graph.outgoing_flow(next).map(|e| e.target.as_str())));
            }
        }
    }

    let mut component: HashMap<&str, usize> = HashMap::with_capacity(finished.len());
    let mut next_id = 0;
    for &root in finished.iter().rev() {
        if component.contains_key(root) {
            continue;
        }
        component.insert(root, next_id);
        let mut pending = vec![root];
        while let Some(key) = pending.pop() {
            for edge in graph.incoming_flow(key) {
                let source = edge.source.as_str();
                if !component.contains_key(source) {
                    component.insert(source, next_id);
                    pending.push(source);
                }
            }
        }
        next_id += 1;
    }
    component
}

/// Every elementary cycle among flow edges.
///
/// Cycles are enumerated per strongly connected component: for each start
/// node in key order, a backtracking search walks only nodes of the same
/// component with a greater key, so each cycle is found once, beginning at
/// its lowest key.
fn find_cycles(graph: &LineageGraph) -> Vec<Vec<String>> {
    let component = flow_components(graph);
    let mut found: BTreeSet<Vec<String>> = BTreeSet::new();

    for start in graph.node_keys() {
        let Some(&comp) = component.get(start) else {
            continue;
        };
        let mut path: Vec<&str> = vec![start];
        let mut on_path: HashSet<&str> = HashSet::from([start]);
        let mut stack = vec![Frame::new(start, cycle_successors(graph, &component, comp, start, start))];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.neighbors.len() {
                on_path.remove(frame.key);
                path.pop();
                stack.pop();
                continue;
            }
            let next = frame.neighbors[frame.next];
            frame.next += 1;

            if next == start {
                let cycle = path.iter().map(|k| k.to_string()).collect();
                found.insert(canonical_cycle(cycle));
            } else if on_path.insert(next) {
                path.push(next);
                stack.push(Frame::new(next, cycle_successors(graph, &component, comp, start, next)));
            }
        }
    }

    found.into_iter().collect()
}

/// Flow successors of `key` that may continue a cycle rooted at `start`.
fn cycle_successors<'a>(
    graph: &'a LineageGraph,
    component: &HashMap<&str, usize>,
    comp: usize,
    start: &str,
    key: &str,
) -> Vec<&'a str> {
    graph
        .outgoing_flow(key)
        .map(|e| e.target.as_str())
        .filter(|next| *next == start || (component.get(next) == Some(&comp) && *next > start))
        .collect()
}

/// Rotates a cycle so it starts at its lowest key.
fn canonical_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        cycle.rotate_left(min_pos);
    }
    cycle
}

/// Maximum over (pure source, reachable pure sink) pairs of the BFS distance.
fn longest_source_to_sink(graph: &LineageGraph) -> usize {
    let mut max_depth = 0;

    for source in graph.node_keys() {
        if graph.incoming_flow(source).next().is_some() {
            continue;
        }

        let mut distances: HashMap<&str, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        distances.insert(source, 0);
        queue.push_back(source);

        while let Some(current) = queue.pop_front() {
            let depth = distances[current];
            let mut is_sink = true;
            for edge in graph.outgoing_flow(current) {
                is_sink = false;
                let next = edge.target.as_str();
                if !distances.contains_key(next) {
                    distances.insert(next, depth + 1);
                    queue.push_back(next);
                }
            }
            if is_sink {
                max_depth = max_depth.max(depth);
            }
        }
    }

    max_depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::graph::Edge;
    use crate::types::Relation;

    fn graph_with(edges: &[(&str, &str, Relation)]) -> LineageGraph {
        let mut graph = LineageGraph::new();
        for (source, target, relation) in edges {
            graph.add_edge(Edge::new(*source, *target, *relation)).unwrap();
        }
        graph
    }

    #[test]
    fn test_single_flow_cycle() {
        let graph = graph_with(&[
            ("f.b", "f.c", Relation::Derives),
            ("f.c", "f.a", Relation::Derives),
            ("f.a", "f.b", Relation::Derives),
        ]);
        let report = validate(&graph);
        assert_eq!(report.cycles, vec![vec!["f.a".to_string(), "f.b".into(), "f.c".into()]]);
        assert_eq!(report.max_depth, 0);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_contains_edges_never_form_cycles() {
        // dataset contains a field that (via a job) feeds back into the dataset:
        // only CONTAINS closes the loop, so it is not a lineage cycle
        let graph = graph_with(&[
            ("raw.orders", "raw.orders.id", Relation::Contains),
            ("raw.orders", "ns.job", Relation::Consumes),
            ("ns.job", "raw.orders_clean", Relation::Produces),
            ("raw.orders_clean", "raw.orders_clean.id", Relation::Contains),
        ]);
        let report = validate(&graph);
        assert!(report.cycles.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_two_disjoint_cycles() {
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives),
            ("f.b", "f.a", Relation::Derives),
            ("f.x", "f.y", Relation::Derives),
            ("f.y", "f.x", Relation::Derives),
        ]);
        let report = validate(&graph);
        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.cycles[0], vec!["f.a".to_string(), "f.b".into()]);
        assert_eq!(report.cycles[1], vec!["f.x".to_string(), "f.y".into()]);
    }

    #[test]
    fn test_cycles_sharing_nodes() {
        // two cycles through a and d: a -> b -> d -> a and a -> c -> d -> a
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives),
            ("f.a", "f.c", Relation::Derives),
            ("f.b", "f.d", Relation::Derives),
            ("f.c", "f.d", Relation::Derives),
            ("f.d", "f.a", Relation::Derives),
        ]);
        let report = validate(&graph);
        assert_eq!(
            report.cycles,
            vec![
                vec!["f.a".to_string(), "f.b".into(), "f.d".into()],
                vec!["f.a".to_string(), "f.c".into(), "f.d".into()],
            ]
        );
    }

    #[test]
    fn test_figure_eight_cycles() {
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives),
            ("f.b", "f.a", Relation::Derives),
            ("f.b", "f.c", Relation::Derives),
            ("f.c", "f.b", Relation::Derives),
            ("f.c", "f.z", Relation::Derives),
        ]);
        let report = validate(&graph);
        assert_eq!(
            report.cycles,
            vec![
                vec!["f.a".to_string(), "f.b".into()],
                vec!["f.b".to_string(), "f.c".into()],
            ]
        );
    }

    #[test]
    fn test_self_loop() {
        let graph = graph_with(&[("f.a", "f.a", Relation::Derives)]);
        assert_eq!(validate(&graph).cycles, vec![vec!["f.a".to_string()]]);
    }

    #[test]
    fn test_orphans_ignore_contains() {
        let graph = graph_with(&[
            ("raw.orders", "raw.orders.id", Relation::Contains),
            ("raw.orders.q", "out.t.total", Relation::Derives),
        ]);
        let report = validate(&graph);
        assert_eq!(
            report.orphan_nodes.iter().cloned().collect::<Vec<_>>(),
            vec!["raw.orders", "raw.orders.id"]
        );
    }

    #[test]
    fn test_max_depth_uses_shortest_paths() {
        // the shortcut a -> d makes a..d count as 1; x -> y -> z counts as 2
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives),
            ("f.b", "f.c", Relation::Derives),
            ("f.c", "f.d", Relation::Derives),
            ("f.a", "f.d", Relation::Derives),
            ("f.x", "f.y", Relation::Derives),
            ("f.y", "f.z", Relation::Derives),
        ]);
        assert_eq!(validate(&graph).max_depth, 2);
    }

    #[test]
    fn test_counts_and_placeholders() {
        let graph = graph_with(&[
            ("ns.job", "raw.orders", Relation::Produces),
            ("raw.orders", "raw.orders.id", Relation::Contains),
        ]);
        let report = validate(&graph);
        assert_eq!(report.node_count, 3);
        assert_eq!(report.edge_count, 2);
        assert_eq!(
            report.kind_counts,
            KindCounts {
                datasets: 1,
                fields: 1,
                jobs: 1
            }
        );
        // every node was created as an incomplete edge endpoint
        assert_eq!(report.inferred_nodes.len(), 3);
        assert_eq!(report.max_depth, 1);
    }

    #[test]
    fn test_empty_graph() {
        let report = validate(&LineageGraph::new());
        assert!(report.is_clean());
        assert!(!report.has_findings());
        assert_eq!(report.max_depth, 0);
    }
}
