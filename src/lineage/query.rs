//! Upstream trace and downstream impact queries.
//!
//! Both queries are bounded breadth-first traversals keyed by node key, so
//! every node is expanded at most once and cyclic graphs terminate. Callers
//! may name nodes by full key or by a bare suffix (`net_amount`,
//! `orders.customer_id`); a suffix that matches several nodes is rejected
//! rather than guessed.

use super::graph::{Edge, LineageGraph, Node};
use crate::error::{Result, TributaryError};
use crate::observability;
use crate::types::{NodeKind, Relation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::debug;

/// One node of an upstream trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub key: String,
    pub kind: NodeKind,
    pub display_name: String,
    pub namespace: String,
    /// Distance from the traced node.
    pub depth: usize,
    /// Relation of the edge connecting this node to its parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
    /// Transformation text of that edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    /// Jobs that asserted that edge.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub jobs: BTreeSet<String>,
    /// Already expanded elsewhere in the tree; listed but not expanded again.
    #[serde(default)]
    pub seen_before: bool,
    /// Has upstream contributors that the depth bound cut off.
    #[serde(default)]
    pub truncated: bool,
    /// Direct upstream contributors.
    #[serde(default)]
    pub upstream: Vec<TraceNode>,
}

impl TraceNode {
    /// Keys of the direct upstream contributors.
    pub fn child_keys(&self) -> Vec<&str> {
        self.upstream.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn find(&self, key: &str) -> Option<&TraceNode> {
        if self.key == key {
            return Some(self);
        }
        self.upstream.iter().find_map(|c| c.find(key))
    }
}

/// Result of [`QueryEngine::trace_upstream`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTree {
    pub root: TraceNode,
    pub max_depth: Option<usize>,
    /// True if any node was cut off by `max_depth`.
    pub truncated: bool,
    /// Distinct nodes in the tree, the root included.
    pub node_count: usize,
}

/// A node reached by an impact query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub key: String,
    pub display_name: String,
    /// BFS distance from the changed node.
    pub distance: usize,
}

/// Risk level for impact analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    fn assess(affected_jobs: usize, affected_datasets: usize) -> Self {
        if affected_jobs > 10 || affected_datasets > 50 {
            RiskLevel::Critical
        } else if affected_jobs > 5 || affected_datasets > 20 {
            RiskLevel::High
        } else if affected_jobs > 2 || affected_datasets > 5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Result of [`QueryEngine::analyze_downstream_impact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactSet {
    pub source: String,
    pub max_depth: Option<usize>,
    /// Reached nodes grouped by kind, each group ordered by `(distance, key)`.
    pub by_kind: BTreeMap<NodeKind, Vec<ImpactEntry>>,
    /// True if the depth bound cut off further downstream nodes.
    pub truncated: bool,
    pub risk_level: RiskLevel,
}

impl ImpactSet {
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = &ImpactEntry> {
        self.by_kind.values().flatten()
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        self.entries().map(|e| e.key.as_str()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().any(|e| e.key == key)
    }

    pub fn distance(&self, key: &str) -> Option<usize> {
        self.entries().find(|e| e.key == key).map(|e| e.distance)
    }

    pub fn of_kind(&self, kind: NodeKind) -> &[ImpactEntry] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Read-only queries over a built graph.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'g> {
    graph: &'g LineageGraph,
}

impl<'g> QueryEngine<'g> {
    pub fn new(graph: &'g LineageGraph) -> Self {
        Self { graph }
    }

    /// Resolves a full key or a bare `"." + name` suffix to exactly one node.
    pub fn resolve(&self, reference: &str) -> Result<&'g Node> {
        if reference.is_empty() {
            return Err(TributaryError::NotFound(reference.to_string()));
        }
        if let Some(node) = self.graph.node(reference) {
            return Ok(node);
        }

        let suffix = format!(".{}", reference);
        let matches: Vec<&Node> = self.graph.nodes().filter(|n| n.key.ends_with(&suffix)).collect();
        match matches.as_slice() {
            [] => Err(TributaryError::NotFound(reference.to_string())),
            [node] => {
                debug!(reference, key = %node.key, "Resolved bare reference");
                Ok(node)
            }
            many => Err(TributaryError::AmbiguousReference {
                reference: reference.to_string(),
                candidates: many.iter().map(|n| n.key.clone()).collect(),
            }),
        }
    }

    /// Traces what contributes to a node.
    ///
    /// Children of a node are its incoming flow edges. A field that is not
    /// derived from other fields also lists its containing dataset, so raw
    /// columns trace back to the job that produced them.
    pub fn trace_upstream(&self, reference: &str, max_depth: Option<usize>) -> Result<TraceTree> {
        observability::record_query("trace");
        let root = self.resolve(reference)?;

        struct Slot<'a> {
            node: &'a Node,
            depth: usize,
            via: Option<&'a Edge>,
            seen_before: bool,
            truncated: bool,
            children: Vec<usize>,
        }

        let mut arena = vec![Slot {
            node: root,
            depth: 0,
            via: None,
            seen_before: false,
            truncated: false,
            children: Vec::new(),
        }];
        let mut visited: HashSet<&str> = HashSet::from([root.key.as_str()]);
        let mut queue = VecDeque::from([0usize]);
        let mut truncated = false;

        while let Some(idx) = queue.pop_front() {
            let current = arena[idx].node;
            let depth = arena[idx].depth;
            let edges = self.upstream_edges(&current.key);
            if edges.is_empty() {
                continue;
            }
            if max_depth.is_some_and(|max| depth >= max) {
                arena[idx].truncated = true;
                truncated = true;
                continue;
            }

            for edge in edges {
                let Some(node) = self.graph.node(&edge.source) else {
                    continue;
                };
                let seen_before = !visited.insert(node.key.as_str());
                let child = arena.len();
                arena.push(Slot {
                    node,
                    depth: depth + 1,
                    via: Some(edge),
                    seen_before,
                    truncated: false,
                    children: Vec::new(),
                });
                arena[idx].children.push(child);
                if !seen_before {
                    queue.push_back(child);
                }
            }
        }

        // children always sit after their parent, so fold from the back
        let mut built: Vec<Option<TraceNode>> = Vec::with_capacity(arena.len());
        built.resize_with(arena.len(), || None);
        for idx in (0..arena.len()).rev() {
            let slot = &arena[idx];
            let upstream = slot
                .children
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[idx] = Some(TraceNode {
                key: slot.node.key.clone(),
                kind: slot.node.kind,
                display_name: slot.node.display_name.clone(),
                namespace: slot.node.namespace.clone(),
                depth: slot.depth,
                relation: slot.via.map(|e| e.relation),
                transformation: slot.via.and_then(|e| e.transformation.clone()),
                jobs: slot.via.map(|e| e.jobs.clone()).unwrap_or_default(),
                seen_before: slot.seen_before,
                truncated: slot.truncated,
                upstream,
            });
        }

        let root = built[0]
            .take()
            .ok_or_else(|| TributaryError::Internal("trace produced no root".to_string()))?;
        debug!(key = %root.key, nodes = visited.len(), truncated, "Upstream trace complete");

        Ok(TraceTree {
            root,
            max_depth,
            truncated,
            node_count: visited.len(),
        })
    }

    /// Everything downstream of a node, grouped by kind, with BFS distances.
    pub fn analyze_downstream_impact(&self, reference: &str, max_depth: Option<usize>) -> Result<ImpactSet> {
        observability::record_query("impact");
        let source = self.resolve(reference)?;

        let mut distances: HashMap<&str, usize> = HashMap::from([(source.key.as_str(), 0)]);
        let mut queue = VecDeque::from([source.key.as_str()]);
        let mut reached: Vec<(&Node, usize)> = Vec::new();
        let mut truncated = false;

        while let Some(current) = queue.pop_front() {
            let depth = distances[current];
            let mut outgoing = self.graph.outgoing_flow(current).peekable();
            if outgoing.peek().is_none() {
                continue;
            }
            if max_depth.is_some_and(|max| depth >= max) {
                truncated = true;
                continue;
            }
            for edge in outgoing {
                let next = edge.target.as_str();
                if distances.contains_key(next) {
                    continue;
                }
                distances.insert(next, depth + 1);
                if let Some(node) = self.graph.node(next) {
                    reached.push((node, depth + 1));
                }
                queue.push_back(next);
            }
        }

        let mut by_kind: BTreeMap<NodeKind, Vec<ImpactEntry>> = BTreeMap::new();
        for (node, distance) in reached {
            by_kind.entry(node.kind).or_default().push(ImpactEntry {
                key: node.key.clone(),
                display_name: node.display_name.clone(),
                distance,
            });
        }
        for entries in by_kind.values_mut() {
            entries.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.key.cmp(&b.key)));
        }

        let jobs = by_kind.get(&NodeKind::Job).map_or(0, Vec::len);
        let datasets = by_kind.get(&NodeKind::Dataset).map_or(0, Vec::len);
        let impact = ImpactSet {
            source: source.key.clone(),
            max_depth,
            by_kind,
            truncated,
            risk_level: RiskLevel::assess(jobs, datasets),
        };
        debug!(key = %impact.source, reached = impact.len(), "Downstream impact complete");
        Ok(impact)
    }

    /// Shortest flow path from one node to another, if any.
    pub fn find_path(&self, from: &str, to: &str, max_depth: Option<usize>) -> Result<Option<Vec<String>>> {
        observability::record_query("path");
        let from = self.resolve(from)?.key.as_str();
        let to = self.resolve(to)?.key.as_str();

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut depths: HashMap<&str, usize> = HashMap::from([(from, 0)]);
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to.to_string()];
                let mut node = to;
                while let Some(&parent) = parents.get(node) {
                    path.push(parent.to_string());
                    node = parent;
                }
                path.reverse();
                return Ok(Some(path));
            }

            let depth = depths[current];
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for edge in self.graph.outgoing_flow(current) {
                let next = edge.target.as_str();
                if !depths.contains_key(next) {
                    depths.insert(next, depth + 1);
                    parents.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        Ok(None)
    }

    /// Every simple upstream path from a node to the sources feeding it.
    ///
    /// Each path starts at the resolved node and follows the same upstream
    /// edges as [`trace_upstream`](Self::trace_upstream). A path ends at a node
    /// with no upstream contributors or after `max_depth` edges. Branches that
    /// would revisit a node already on the path are dropped.
    pub fn lineage_paths(&self, reference: &str, max_depth: Option<usize>) -> Result<Vec<Vec<String>>> {
        observability::record_query("paths");
        let start = self.resolve(reference)?.key.as_str();

        let root = self.upstream_keys(start);
        if root.is_empty() || max_depth == Some(0) {
            return Ok(vec![vec![start.to_string()]]);
        }

        let mut paths = Vec::new();
        let mut path = vec![start];
        let mut on_path: HashSet<&str> = HashSet::from([start]);
        let mut stack = vec![root.into_iter()];

        while let Some(frame) = stack.last_mut() {
            let Some(next) = frame.next() else {
                stack.pop();
                if let Some(done) = path.pop() {
                    on_path.remove(done);
                }
                continue;
            };
            if on_path.contains(next) {
                continue;
            }

            path.push(next);
            let upstream = self.upstream_keys(next);
            if upstream.is_empty() || max_depth.is_some_and(|max| path.len() > max) {
                paths.push(path.iter().map(|k| k.to_string()).collect());
                path.pop();
                continue;
            }
            on_path.insert(next);
            stack.push(upstream.into_iter());
        }

        debug!(key = start, paths = paths.len(), "Lineage paths complete");
        Ok(paths)
    }

    /// Distinct upstream neighbours in key order.
    fn upstream_keys(&self, key: &str) -> Vec<&'g str> {
        let keys: BTreeSet<&'g str> = self
            .upstream_edges(key)
            .into_iter()
            .map(|e| e.source.as_str())
            .collect();
        keys.into_iter().collect()
    }

    fn upstream_edges(&self, key: &str) -> Vec<&'g Edge> {
        let graph = self.graph;
        let derived = graph.incoming(key).any(|e| e.relation == Relation::Derives);
        let is_field = graph.node(key).map_or(false, |n| n.kind == NodeKind::Field);
        graph
            .incoming(key)
            .filter(|e| e.relation.is_flow() || (is_field && !derived))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::graph::Edge;

    fn graph_with(edges: &[(&str, &str, Relation, Option<&str>)]) -> LineageGraph {
        let mut graph = LineageGraph::new();
        for (source, target, relation, transform) in edges {
            let mut edge = Edge::new(*source, *target, *relation).with_job("ns.job");
            if let Some(t) = transform {
                edge = edge.with_transformation(t);
            }
            graph.add_edge(edge).unwrap();
        }
        graph
    }

    fn orders_graph() -> LineageGraph {
        graph_with(&[
            ("raw.orders", "raw.orders.quantity", Relation::Contains, None),
            ("raw.orders", "raw.orders.unit_price", Relation::Contains, None),
            ("raw.orders", "ns.etl", Relation::Consumes, None),
            ("ns.etl", "out.clean", Relation::Produces, None),
            ("out.clean", "out.clean.net_amount", Relation::Contains, None),
            ("raw.orders.quantity", "out.clean.net_amount", Relation::Derives, Some("q * p")),
            ("raw.orders.unit_price", "out.clean.net_amount", Relation::Derives, Some("q * p")),
            ("out.clean.net_amount", "out.clean.profit", Relation::Derives, Some("net * 0.3")),
        ])
    }

    #[test]
    fn test_resolve_exact_and_suffix() {
        let graph = orders_graph();
        let engine = QueryEngine::new(&graph);
        assert_eq!(engine.resolve("raw.orders.quantity").unwrap().key, "raw.orders.quantity");
        assert_eq!(engine.resolve("quantity").unwrap().key, "raw.orders.quantity");
        assert_eq!(engine.resolve("clean.profit").unwrap().key, "out.clean.profit");
        assert!(matches!(engine.resolve("missing"), Err(TributaryError::NotFound(_))));
        assert!(matches!(engine.resolve(""), Err(TributaryError::NotFound(_))));
    }

    #[test]
    fn test_resolve_ambiguous() {
        let graph = graph_with(&[
            ("raw.orders", "raw.orders.customer_id", Relation::Contains, None),
            ("raw.archived_orders", "raw.archived_orders.customer_id", Relation::Contains, None),
        ]);
        let engine = QueryEngine::new(&graph);
        match engine.resolve("customer_id") {
            Err(TributaryError::AmbiguousReference { candidates, .. }) => {
                assert_eq!(
                    candidates,
                    vec!["raw.archived_orders.customer_id", "raw.orders.customer_id"]
                );
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(
            engine.resolve("orders.customer_id").unwrap().key,
            "raw.orders.customer_id"
        );
    }

    #[test]
    fn test_trace_derived_field_children() {
        let graph = orders_graph();
        let tree = QueryEngine::new(&graph).trace_upstream("net_amount", None).unwrap();

        assert_eq!(tree.root.key, "out.clean.net_amount");
        assert_eq!(
            tree.root.child_keys(),
            vec!["raw.orders.quantity", "raw.orders.unit_price"]
        );
        assert!(tree.root.upstream.iter().all(|c| c.transformation.as_deref() == Some("q * p")));
        assert!(!tree.truncated);

        // raw columns continue through their dataset to nothing upstream of it
        let quantity = tree.root.find("raw.orders.quantity").unwrap();
        assert_eq!(quantity.child_keys(), vec!["raw.orders"]);
        assert_eq!(quantity.upstream[0].relation, Some(Relation::Contains));
    }

    #[test]
    fn test_trace_marks_repeated_nodes() {
        let graph = orders_graph();
        let tree = QueryEngine::new(&graph).trace_upstream("net_amount", None).unwrap();
        let unit_price = tree.root.find("raw.orders.unit_price").unwrap();
        let dataset = &unit_price.upstream[0];
        assert_eq!(dataset.key, "raw.orders");
        assert!(dataset.seen_before);
        assert!(dataset.upstream.is_empty());
        assert_eq!(tree.node_count, 4);
    }

    #[test]
    fn test_trace_depth_bound() {
        let graph = orders_graph();
        let tree = QueryEngine::new(&graph).trace_upstream("profit", Some(1)).unwrap();
        assert!(tree.truncated);
        let net = &tree.root.upstream[0];
        assert_eq!(net.key, "out.clean.net_amount");
        assert!(net.truncated);
        assert!(net.upstream.is_empty());

        let tree = QueryEngine::new(&graph).trace_upstream("profit", Some(0)).unwrap();
        assert!(tree.root.truncated);
        assert!(tree.root.upstream.is_empty());
    }

    #[test]
    fn test_trace_terminates_on_cycle() {
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives, None),
            ("f.b", "f.c", Relation::Derives, None),
            ("f.c", "f.a", Relation::Derives, None),
        ]);
        let tree = QueryEngine::new(&graph).trace_upstream("f.a", None).unwrap();
        assert_eq!(tree.node_count, 3);
        let back = tree.root.find("f.b").unwrap();
        assert_eq!(back.upstream[0].key, "f.a");
        assert!(back.upstream[0].seen_before);
    }

    #[test]
    fn test_impact_distances_and_kinds() {
        let graph = orders_graph();
        let impact = QueryEngine::new(&graph)
            .analyze_downstream_impact("raw.orders", None)
            .unwrap();

        assert_eq!(impact.distance("ns.etl"), Some(1));
        assert_eq!(impact.distance("out.clean"), Some(2));
        assert_eq!(impact.of_kind(NodeKind::Job).len(), 1);
        assert_eq!(impact.of_kind(NodeKind::Dataset).len(), 1);
        // CONTAINS is not followed
        assert!(!impact.contains("raw.orders.quantity"));
        assert_eq!(impact.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_impact_depth_bound() {
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives, None),
            ("f.b", "f.c", Relation::Derives, None),
        ]);
        let impact = QueryEngine::new(&graph)
            .analyze_downstream_impact("f.a", Some(1))
            .unwrap();
        assert_eq!(impact.keys().into_iter().collect::<Vec<_>>(), vec!["f.b"]);
        assert_eq!(impact.distance("f.b"), Some(1));
        assert!(impact.truncated);
    }

    #[test]
    fn test_impact_source_excluded_on_cycle() {
        let graph = graph_with(&[
            ("f.a", "f.b", Relation::Derives, None),
            ("f.b", "f.a", Relation::Derives, None),
        ]);
        let impact = QueryEngine::new(&graph)
            .analyze_downstream_impact("f.a", None)
            .unwrap();
        assert_eq!(impact.len(), 1);
        assert!(!impact.contains("f.a"));
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::assess(0, 0), RiskLevel::Low);
        assert_eq!(RiskLevel::assess(3, 0), RiskLevel::Medium);
        assert_eq!(RiskLevel::assess(0, 21), RiskLevel::High);
        assert_eq!(RiskLevel::assess(11, 0), RiskLevel::Critical);
    }

    #[test]
    fn test_find_path() {
        let graph = orders_graph();
        let engine = QueryEngine::new(&graph);
        let path = engine.find_path("raw.orders", "out.clean", None).unwrap().unwrap();
        assert_eq!(path, vec!["raw.orders", "ns.etl", "out.clean"]);

        assert_eq!(engine.find_path("quantity", "profit", None).unwrap().unwrap().len(), 3);
        assert!(engine.find_path("profit", "quantity", None).unwrap().is_none());
        assert!(engine.find_path("raw.orders", "out.clean", Some(1)).unwrap().is_none());
    }

    #[test]
    fn test_lineage_paths_reach_sources() {
        let graph = orders_graph();
        let engine = QueryEngine::new(&graph);

        let paths = engine.lineage_paths("profit", None).unwrap();
        assert_eq!(
            paths,
            vec![
                vec!["out.clean.profit", "out.clean.net_amount", "raw.orders.quantity", "raw.orders"],
                vec!["out.clean.profit", "out.clean.net_amount", "raw.orders.unit_price", "raw.orders"],
            ]
        );

        let bounded = engine.lineage_paths("profit", Some(1)).unwrap();
        assert_eq!(bounded, vec![vec!["out.clean.profit", "out.clean.net_amount"]]);

        assert_eq!(engine.lineage_paths("raw.orders", None).unwrap(), vec![vec!["raw.orders"]]);
    }

    #[test]
    fn test_lineage_paths_skip_cycles() {
        let graph = graph_with(&[
            ("x", "a", Relation::Derives, None),
            ("a", "b", Relation::Derives, None),
            ("b", "a", Relation::Derives, None),
        ]);
        let paths = QueryEngine::new(&graph).lineage_paths("b", None).unwrap();
        assert_eq!(paths, vec![vec!["b", "a", "x"]]);
    }
}
