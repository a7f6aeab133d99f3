//! Interchange documents for external tools.

use super::graph::{Edge, LineageGraph, Metadata, Node};
use crate::error::{Result, TributaryError};
use crate::types::{NodeKind, Relation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Output format for exported documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
    Mermaid,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Mermaid => "mermaid",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = TributaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "mermaid" | "mmd" => Ok(ExportFormat::Mermaid),
            other => Err(TributaryError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A node as it appears in an exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub key: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An edge as it appears in an exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    #[serde(default)]
    pub jobs: BTreeSet<String>,
    #[serde(default)]
    pub runs: BTreeSet<String>,
}

/// Generic node/edge document. Lossless: [`GraphDocument::into_graph`]
/// rebuilds a graph equal to the one it was taken from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphDocument {
    pub fn from_graph(graph: &LineageGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|n| NodeRecord {
                key: n.key.clone(),
                kind: n.kind,
                display_name: n.display_name.clone(),
                namespace: n.namespace.clone(),
                metadata: n.metadata.clone(),
            })
            .collect();
        let edges = graph
            .edges()
            .map(|e| EdgeRecord {
                source: e.source.clone(),
                target: e.target.clone(),
                relation: e.relation,
                transformation: e.transformation.clone(),
                jobs: e.jobs.clone(),
                runs: e.runs.clone(),
            })
            .collect();
        Self { nodes, edges }
    }

    /// Re-imports the document. Fails on the same invariant violations the
    /// builder would reject (key reused across kinds, wrong endpoint kinds).
    pub fn into_graph(self) -> Result<LineageGraph> {
        let mut graph = LineageGraph::new();
        for record in self.nodes {
            let mut node = Node::new(record.key, record.kind, record.display_name, record.namespace);
            node.metadata = record.metadata;
            graph.upsert_node(node)?;
        }
        for record in self.edges {
            let mut edge = Edge::new(record.source, record.target, record.relation);
            edge.transformation = record.transformation;
            edge.jobs = record.jobs;
            edge.runs = record.runs;
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Renders the whole graph in the requested format.
pub fn export(graph: &LineageGraph, format: ExportFormat, pretty: bool) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let doc = GraphDocument::from_graph(graph);
            if pretty {
                Ok(serde_json::to_string_pretty(&doc)?)
            } else {
                Ok(serde_json::to_string(&doc)?)
            }
        }
        ExportFormat::Yaml => Ok(serde_yaml::to_string(&GraphDocument::from_graph(graph))?),
        ExportFormat::Mermaid => Ok(to_mermaid(graph)),
    }
}

/// Renders a query or validation result. Mermaid only applies to whole graphs.
pub fn export_value<T: Serialize>(value: &T, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        ExportFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        ExportFormat::Mermaid => Err(TributaryError::UnsupportedFormat(
            "mermaid output is only available for whole graphs".to_string(),
        )),
    }
}

/// Mermaid flowchart: datasets as cylinders, jobs as rhombi, fields as
/// rounded boxes. CONTAINS edges are dotted.
pub fn to_mermaid(graph: &LineageGraph) -> String {
    let mut out = String::from("graph LR\n");
    let mut ids: HashMap<&str, String> = HashMap::with_capacity(graph.node_count());

    for (idx, node) in graph.nodes().enumerate() {
        let id = format!("n{}", idx);
        let label = escape_label(&node.key);
        let shape = match node.kind {
            NodeKind::Dataset => format!("[(\"{}\")]", label),
            NodeKind::Job => format!("{{\"{}\"}}", label),
            NodeKind::Field => format!("(\"{}\")", label),
        };
        out.push_str(&format!("    {}{}\n", id, shape));
        ids.insert(node.key.as_str(), id);
    }

    for edge in graph.edges() {
        let (Some(source), Some(target)) = (ids.get(edge.source.as_str()), ids.get(edge.target.as_str()))
        else {
            continue;
        };
        let arrow = match (edge.relation, edge.transformation.as_deref()) {
            (Relation::Contains, _) => "-.->".to_string(),
            (Relation::Derives, Some(t)) => format!("-->|\"{}\"|", escape_label(t)),
            _ => "-->".to_string(),
        };
        out.push_str(&format!("    {} {} {}\n", source, arrow, target));
    }

    for (class, kind, fill) in [
        ("dataset", NodeKind::Dataset, "#e1f5fe"),
        ("job", NodeKind::Job, "#fff3e0"),
        ("field", NodeKind::Field, "#f1f8e9"),
    ] {
        let members: Vec<&str> = graph
            .nodes_of_kind(kind)
            .filter_map(|n| ids.get(n.key.as_str()).map(String::as_str))
            .collect();
        if members.is_empty() {
            continue;
        }
        out.push_str(&format!("    classDef {} fill:{}\n", class, fill));
        out.push_str(&format!("    class {} {}\n", members.join(","), class));
    }

    out
}

fn escape_label(text: &str) -> String {
    text.replace('"', "#quot;").replace('\n', " ")
}
