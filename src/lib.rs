//! Tributary - lineage graph and impact analysis for data pipelines.
//!
//! Pipelines report what each run read, wrote and derived as a stream of run
//! events. Tributary folds that stream into a typed provenance graph of
//! datasets, fields and jobs, then answers the questions data teams ask of it:
//! where a column came from, what breaks if a table changes, and whether the
//! recorded lineage is structurally sound.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Event Source: JSON Lines log | in-memory events            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Graph Builder: run tracking | column lineage resolution    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Lineage Graph: nodes | typed edges | adjacency indexes     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Validator | Query Engine | Exporter (read-only consumers)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tributary::config::TributaryConfig;
//! use tributary::lineage::QueryEngine;
//!
//! fn main() -> tributary::Result<()> {
//!     let config = TributaryConfig::development();
//!     let output = tributary::load(&config)?;
//!
//!     let trace = QueryEngine::new(&output.graph).trace_upstream("net_amount", Some(3))?;
//!     println!("{} direct contributors", trace.root.upstream.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod events;
pub mod lineage;

pub mod cli;
pub mod observability;

// Re-exports
pub use error::{Result, TributaryError};
pub use types::*;

use config::TributaryConfig;
use events::JsonLinesSource;
use lineage::BuildOutput;
use tracing::info;

/// Builds the lineage graph from the configured event log.
pub fn load(config: &TributaryConfig) -> Result<BuildOutput> {
    info!(path = %config.events.path.display(), "Loading lineage events");

    let source = JsonLinesSource::new(&config.events.path)
        .skip_invalid_lines(config.events.skip_invalid_lines);
    let output = lineage::build_from_source(&source)?;

    info!(
        nodes = output.graph.node_count(),
        edges = output.graph.edge_count(),
        warnings = output.warnings.len(),
        "Lineage graph built"
    );
    Ok(output)
}
