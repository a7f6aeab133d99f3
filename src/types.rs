//! Core type definitions for the Tributary lineage engine.
//!
//! # Key Types
//!
//! - [`NodeKind`]: the three node variants of a lineage graph
//! - [`Relation`]: the four typed edge relations
//! - [`EdgeKey`]: identity of an edge, `(source, target, relation)`
//!
//! # Identity Keys
//!
//! Node identity is a dotted string built by the helpers below:
//!
//! ```rust
//! use tributary::types::{dataset_key, field_key, job_key};
//!
//! let ds = dataset_key("raw_data", "orders");
//! assert_eq!(ds, "raw_data.orders");
//! assert_eq!(field_key(&ds, "quantity"), "raw_data.orders.quantity");
//! assert_eq!(job_key("ecommerce", "etl_orders"), "ecommerce.etl_orders");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node variant in a lineage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A table, file or other addressable collection of records.
    Dataset,
    /// A column of a dataset.
    Field,
    /// An ETL job; each run of it is attributed to this node.
    Job,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::Dataset, NodeKind::Field, NodeKind::Job];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Dataset => "dataset",
            NodeKind::Field => "field",
            NodeKind::Job => "job",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed edge relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    /// job -> dataset
    Produces,
    /// dataset -> job
    Consumes,
    /// dataset -> field
    Contains,
    /// field -> field
    Derives,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::Produces,
        Relation::Consumes,
        Relation::Contains,
        Relation::Derives,
    ];

    /// Flow edges carry data; `Contains` is structural only.
    pub fn is_flow(&self) -> bool {
        !matches!(self, Relation::Contains)
    }

    /// The `(source, target)` node kinds this relation connects.
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            Relation::Produces => (NodeKind::Job, NodeKind::Dataset),
            Relation::Consumes => (NodeKind::Dataset, NodeKind::Job),
            Relation::Contains => (NodeKind::Dataset, NodeKind::Field),
            Relation::Derives => (NodeKind::Field, NodeKind::Field),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Produces => "PRODUCES",
            Relation::Consumes => "CONSUMES",
            Relation::Contains => "CONTAINS",
            Relation::Derives => "DERIVES",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown relation: {}", s))
    }
}

/// Identity of an edge. Ordering is `(source, target, relation)`, which keeps
/// adjacency iteration deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub relation: Relation,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: Relation) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.relation, self.target)
    }
}

/// Key of a dataset node.
pub fn dataset_key(namespace: &str, name: &str) -> String {
    qualify(namespace, name)
}

/// Key of a field node within a dataset.
pub fn field_key(dataset_key: &str, field: &str) -> String {
    qualify(dataset_key, field)
}

/// Key of a job node.
pub fn job_key(namespace: &str, name: &str) -> String {
    qualify(namespace, name)
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
