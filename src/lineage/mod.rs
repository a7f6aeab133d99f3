//! Lineage graph construction and analysis
//!
//! - Folding run events into a typed provenance graph
//! - Structural validation (cycles, orphans, depth)
//! - Upstream trace and downstream impact analysis
//! - Export to JSON, YAML and Mermaid

pub mod builder;
pub mod export;
pub mod graph;
pub mod query;
pub mod validate;

pub use builder::{build, build_from_source, BuildOutput, BuildStats, BuildWarning, GraphBuilder};
pub use export::{export, export_value, to_mermaid, EdgeRecord, ExportFormat, GraphDocument, NodeRecord};
pub use graph::{Edge, LineageGraph, Metadata, Node, META_INCOMPLETE, META_INFERRED};
pub use query::{ImpactEntry, ImpactSet, QueryEngine, RiskLevel, TraceNode, TraceTree};
pub use validate::{validate, KindCounts, ValidationReport};
