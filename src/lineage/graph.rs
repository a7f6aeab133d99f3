// Lineage Graph for Data Provenance

use crate::error::{Result, TributaryError};
use crate::types::{EdgeKey, NodeKind, Relation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Metadata flag set on fields synthesized from column lineage.
pub const META_INFERRED: &str = "inferred";
/// Metadata flag set on nodes created only because an edge referenced them.
pub const META_INCOMPLETE: &str = "incomplete";

/// Free-form node metadata. Ordered so that exports are stable.
pub type Metadata = BTreeMap<String, Value>;

/// Lineage node representing a dataset, field or job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identity key
    pub key: String,
    /// Node variant
    pub kind: NodeKind,
    /// Display name
    pub display_name: String,
    /// Namespace
    pub namespace: String,
    /// Schema info, row counts, timestamps, placeholder flags
    #[serde(default)]
    pub metadata: Metadata,
}

impl Node {
    /// Creates a new node
    pub fn new(
        key: impl Into<String>,
        kind: NodeKind,
        display_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            display_name: display_name.into(),
            namespace: namespace.into(),
            metadata: Metadata::new(),
        }
    }

    /// Adds a metadata attribute
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Synthesized from column lineage rather than declared by an I/O event.
    pub fn is_inferred(&self) -> bool {
        self.flag(META_INFERRED)
    }

    /// Created as an edge endpoint without any declaration.
    pub fn is_incomplete(&self) -> bool {
        self.flag(META_INCOMPLETE)
    }

    fn flag(&self, name: &str) -> bool {
        self.metadata.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    fn is_placeholder(&self) -> bool {
        self.is_inferred() || self.is_incomplete()
    }

    /// Merges a later observation of the same node: the latest non-empty
    /// value wins per attribute.
    fn merge(&mut self, other: Node) {
        let declared = !self.is_placeholder();
        if !other.is_placeholder() {
            self.metadata.remove(META_INFERRED);
            self.metadata.remove(META_INCOMPLETE);
            if !other.display_name.is_empty() {
                self.display_name = other.display_name;
            }
            if !other.namespace.is_empty() {
                self.namespace = other.namespace;
            }
        }
        for (key, value) in other.metadata {
            // a placeholder observation never downgrades a declared node
            if declared && (key == META_INFERRED || key == META_INCOMPLETE) {
                continue;
            }
            if !is_empty_value(&value) {
                self.metadata.insert(key, value);
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Lineage edge representing data flow or containment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node key
    pub source: String,
    /// Target node key
    pub target: String,
    /// Edge relation
    pub relation: Relation,
    /// Transformation details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    /// Keys of the jobs whose runs asserted this edge
    #[serde(default)]
    pub jobs: BTreeSet<String>,
    /// Run identifiers that asserted this edge
    #[serde(default)]
    pub runs: BTreeSet<String>,
}

impl Edge {
    /// Creates a new edge
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: Relation) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
            transformation: None,
            jobs: BTreeSet::new(),
            runs: BTreeSet::new(),
        }
    }

    /// Adds transformation description
    pub fn with_transformation(mut self, transform: &str) -> Self {
        if !transform.is_empty() {
            self.transformation = Some(transform.to_string());
        }
        self
    }

    /// Attributes the edge to a job
    pub fn with_job(mut self, job_key: &str) -> Self {
        self.jobs.insert(job_key.to_string());
        self
    }

    /// Attributes the edge to a run
    pub fn with_run(mut self, run_id: &str) -> Self {
        self.runs.insert(run_id.to_string());
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.relation)
    }

    fn merge(&mut self, other: Edge) {
        if other.transformation.is_some() {
            self.transformation = other.transformation;
        }
        self.jobs.extend(other.jobs);
        self.runs.extend(other.runs);
    }
}

/// Lineage graph
///
/// Owns every node and edge; the forward and reverse adjacency indexes are
/// derived from the edge set and only change together with it. Once built the
/// graph is read-only to consumers: all mutation is crate-private.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageGraph {
    /// Nodes by key
    nodes: BTreeMap<String, Node>,
    /// Edges by identity
    edges: BTreeMap<EdgeKey, Edge>,
    /// Outgoing edges: node key -> edge keys
    outgoing: BTreeMap<String, BTreeSet<EdgeKey>>,
    /// Incoming edges: node key -> edge keys
    incoming: BTreeMap<String, BTreeSet<EdgeKey>>,
}

impl LineageGraph {
    /// Creates an empty lineage graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node or merges it into the existing node with the same key.
    ///
    /// Fails if the key already names a node of a different kind.
    pub(crate) fn upsert_node(&mut self, node: Node) -> Result<()> {
        match self.nodes.get_mut(&node.key) {
            Some(existing) => {
                if existing.kind != node.kind {
                    return Err(TributaryError::InvariantViolation(format!(
                        "key '{}' observed as both {} and {}",
                        node.key, existing.kind, node.kind
                    )));
                }
                existing.merge(node);
            }
            None => {
                self.nodes.insert(node.key.clone(), node);
            }
        }
        Ok(())
    }

    /// Adds an edge, merging attribution into an identical existing edge.
    ///
    /// Endpoints that do not exist yet are created as placeholder nodes of the
    /// kind the relation requires, flagged `incomplete`. An endpoint of the
    /// wrong kind is an invariant violation.
    pub(crate) fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let (source_kind, target_kind) = edge.relation.endpoints();
        self.ensure_endpoint(&edge.source, source_kind, edge.relation)?;
        self.ensure_endpoint(&edge.target, target_kind, edge.relation)?;

        let key = edge.key();
        match self.edges.get_mut(&key) {
            Some(existing) => existing.merge(edge),
            None => {
                self.outgoing
                    .entry(key.source.clone())
                    .or_default()
                    .insert(key.clone());
                self.incoming
                    .entry(key.target.clone())
                    .or_default()
                    .insert(key.clone());
                self.edges.insert(key, edge);
            }
        }
        Ok(())
    }

    fn ensure_endpoint(&mut self, key: &str, kind: NodeKind, relation: Relation) -> Result<()> {
        match self.nodes.get(key) {
            Some(node) if node.kind != kind => Err(TributaryError::InvariantViolation(format!(
                "{} edge requires '{}' to be a {}, but it is a {}",
                relation, key, kind, node.kind
            ))),
            Some(_) => Ok(()),
            None => {
                let (namespace, name) = split_key(key);
                let node = Node::new(key, kind, name, namespace).with_metadata(META_INCOMPLETE, true);
                self.nodes.insert(key.to_string(), node);
                Ok(())
            }
        }
    }

    /// Gets a node
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains_node(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Gets an edge by identity
    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    /// All nodes in key order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in `(source, target, relation)` order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// All node keys in order
    pub fn node_keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Outgoing edges of a node in key order
    pub fn outgoing(&self, key: &str) -> impl Iterator<Item = &Edge> {
        self.adjacent(&self.outgoing, key)
    }

    /// Incoming edges of a node in key order
    pub fn incoming(&self, key: &str) -> impl Iterator<Item = &Edge> {
        self.adjacent(&self.incoming, key)
    }

    fn adjacent<'a>(
        &'a self,
        index: &'a BTreeMap<String, BTreeSet<EdgeKey>>,
        key: &str,
    ) -> impl Iterator<Item = &'a Edge> {
        index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(move |edge_key| self.edges.get(edge_key))
    }

    /// Outgoing flow edges (everything but `CONTAINS`)
    pub fn outgoing_flow(&self, key: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing(key).filter(|e| e.relation.is_flow())
    }

    /// Incoming flow edges (everything but `CONTAINS`)
    pub fn incoming_flow(&self, key: &str) -> impl Iterator<Item = &Edge> {
        self.incoming(key).filter(|e| e.relation.is_flow())
    }

    /// Gets edges between two nodes
    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&Edge> {
        self.outgoing(source).filter(|e| e.target == target).collect()
    }

    /// Fields contained in a dataset
    pub fn fields_of(&self, dataset_key: &str) -> impl Iterator<Item = &Node> {
        self.outgoing(dataset_key)
            .filter(|e| e.relation == Relation::Contains)
            .filter_map(move |e| self.nodes.get(&e.target))
    }

    /// Datasets that contain a field
    pub fn datasets_of(&self, field_key: &str) -> impl Iterator<Item = &Node> {
        self.incoming(field_key)
            .filter(|e| e.relation == Relation::Contains)
            .filter_map(move |e| self.nodes.get(&e.source))
    }

    /// Nodes of one kind
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Gets node count
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Gets edge count
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Splits a key at its last dot into `(namespace, name)`.
pub(crate) fn split_key(key: &str) -> (&str, &str) {
    match key.rsplit_once('.') {
        Some((prefix, name)) => (prefix, name),
        None => ("", key),
    }
}
