//! Folds lineage events into a [`LineageGraph`].
//!
//! Events are applied strictly in source order on one thread. Order only
//! matters for metadata ("latest non-empty value wins"); which nodes and edges
//! exist does not depend on it.
//!
//! Column lineage is buffered per run and resolved when the run ends (or when
//! the build finishes), because pipelines usually report their derivations
//! before declaring the dataset those derived columns are written to.

use super::graph::{split_key, Edge, LineageGraph, Metadata, Node, META_INFERRED};
use crate::error::Result;
use crate::events::{ColumnMapping, Event, EventSource, IoDirection, RunStatus, SchemaField};
use crate::observability;
use crate::types::{dataset_key, field_key, job_key, NodeKind, Relation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

/// Non-fatal data-quality finding raised while building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// An event referenced a run with no preceding `RunStarted`.
    UnknownRun { run_id: String, event: String },
    /// A run id was started twice; the later start replaces the earlier one.
    DuplicateRunStart { run_id: String },
    /// A column lineage reference matched no declared field.
    InferredField { run_id: String, reference: String, key: String },
    /// A column lineage reference matched several declared fields; all were linked.
    AmbiguousColumnReference {
        run_id: String,
        reference: String,
        candidates: Vec<String>,
    },
    /// A column lineage reference named a dataset or job; it was skipped.
    UnresolvableColumnReference {
        run_id: String,
        reference: String,
        key: String,
        found: NodeKind,
    },
    /// A run never reported `RunEnded`.
    UnterminatedRun { run_id: String },
}

impl BuildWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            BuildWarning::UnknownRun { .. } => "unknown_run",
            BuildWarning::DuplicateRunStart { .. } => "duplicate_run_start",
            BuildWarning::InferredField { .. } => "inferred_field",
            BuildWarning::AmbiguousColumnReference { .. } => "ambiguous_column_reference",
            BuildWarning::UnresolvableColumnReference { .. } => "unresolvable_column_reference",
            BuildWarning::UnterminatedRun { .. } => "unterminated_run",
        }
    }
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::UnknownRun { run_id, event } => {
                write!(f, "{} event references unknown run {}", event, run_id)
            }
            BuildWarning::DuplicateRunStart { run_id } => {
                write!(f, "run {} started more than once", run_id)
            }
            BuildWarning::InferredField { run_id, reference, key } => {
                write!(f, "run {}: undeclared field '{}' inferred as {}", run_id, reference, key)
            }
            BuildWarning::AmbiguousColumnReference {
                run_id,
                reference,
                candidates,
            } => write!(
                f,
                "run {}: '{}' matches {} fields ({})",
                run_id,
                reference,
                candidates.len(),
                candidates.join(", ")
            ),
            BuildWarning::UnresolvableColumnReference {
                run_id,
                reference,
                key,
                found,
            } => write!(
                f,
                "run {}: column reference '{}' names {} {}, skipped",
                run_id, reference, found, key
            ),
            BuildWarning::UnterminatedRun { run_id } => write!(f, "run {} never ended", run_id),
        }
    }
}

/// Counters collected during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub events_applied: usize,
    pub runs_started: usize,
    pub runs_completed: usize,
    pub runs_failed: usize,
    pub io_declarations: usize,
    pub column_mappings: usize,
}

/// Result of a build: the graph plus everything worth telling the caller.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub graph: LineageGraph,
    pub warnings: Vec<BuildWarning>,
    pub stats: BuildStats,
}

/// Builds a graph from an ordered sequence of events.
pub fn build<I>(events: I) -> Result<BuildOutput>
where
    I: IntoIterator<Item = Event>,
{
    let mut builder = GraphBuilder::new();
    for event in events {
        builder.apply(event)?;
    }
    builder.finish()
}

/// Builds a graph from every event an [`EventSource`] supplies.
pub fn build_from_source(source: &dyn EventSource) -> Result<BuildOutput> {
    let mut builder = GraphBuilder::new();
    for event in source.events()? {
        builder.apply(event?)?;
    }
    builder.finish()
}

/// Which side of a derivation a reference sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Upstream,
    Downstream,
}

/// What the builder remembers about a run.
#[derive(Debug, Clone)]
struct RunContext {
    run_id: String,
    job_key: Option<String>,
    started_at: Option<DateTime<Utc>>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    pending: Vec<ColumnMapping>,
    ended: bool,
}

impl RunContext {
    fn new(run_id: &str, job_key: Option<String>, started_at: Option<DateTime<Utc>>) -> Self {
        Self {
            run_id: run_id.to_string(),
            job_key,
            started_at,
            inputs: Vec::new(),
            outputs: Vec::new(),
            pending: Vec::new(),
            ended: false,
        }
    }

    fn datasets(&self, side: Side) -> &[String] {
        match side {
            Side::Upstream => &self.inputs,
            Side::Downstream => &self.outputs,
        }
    }

    fn attribute(&self, edge: Edge) -> Edge {
        let edge = edge.with_run(&self.run_id);
        match &self.job_key {
            Some(job) => edge.with_job(job),
            None => edge,
        }
    }
}

/// Incremental graph builder.
///
/// `apply` events in order, then `finish`. A builder kept alive can keep
/// absorbing new events; the result is identical to rebuilding from the full
/// history.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: LineageGraph,
    runs: Vec<RunContext>,
    run_index: HashMap<String, usize>,
    warnings: Vec<BuildWarning>,
    stats: BuildStats,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of the graph. Column lineage of runs that have not ended
    /// yet is not reflected.
    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    /// Applies one event.
    ///
    /// Only invariant violations are returned as errors; everything else is
    /// recorded as a [`BuildWarning`].
    pub fn apply(&mut self, event: Event) -> Result<()> {
        debug!(kind = event.kind(), run_id = %event.run_id(), "Applying lineage event");
        observability::record_event_applied(event.kind());
        self.stats.events_applied += 1;

        match event {
            Event::RunStarted {
                run_id,
                job_namespace,
                job_name,
                timestamp,
            } => self.on_run_started(&run_id, &job_namespace, &job_name, timestamp),
            Event::IoDeclared {
                run_id,
                direction,
                dataset_namespace,
                dataset_name,
                schema,
                row_count,
            } => self.on_io_declared(&run_id, direction, &dataset_namespace, &dataset_name, &schema, row_count),
            Event::ColumnLineageDeclared { run_id, mappings } => {
                self.on_column_lineage(&run_id, mappings)
            }
            Event::RunEnded {
                run_id,
                status,
                duration_ms,
            } => self.on_run_ended(&run_id, status, duration_ms),
        }
    }

    /// Resolves column lineage of runs still open and returns the graph.
    pub fn finish(mut self) -> Result<BuildOutput> {
        for idx in 0..self.runs.len() {
            if self.runs[idx].ended {
                continue;
            }
            let run_id = self.runs[idx].run_id.clone();
            self.warn(BuildWarning::UnterminatedRun { run_id });
            self.flush_run(idx)?;
        }

        info!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            warnings = self.warnings.len(),
            "Lineage graph built"
        );

        Ok(BuildOutput {
            graph: self.graph,
            warnings: self.warnings,
            stats: self.stats,
        })
    }

    fn on_run_started(
        &mut self,
        run_id: &str,
        job_namespace: &str,
        job_name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(&idx) = self.run_index.get(run_id) {
            self.warn(BuildWarning::DuplicateRunStart {
                run_id: run_id.to_string(),
            });
            if !self.runs[idx].ended {
                self.flush_run(idx)?;
            }
        } else {
            self.stats.runs_started += 1;
        }

        let key = job_key(job_namespace, job_name);
        let job = Node::new(&key, NodeKind::Job, job_name, job_namespace)
            .with_metadata("last_run_id", run_id)
            .with_metadata("last_started_at", timestamp.to_rfc3339());
        self.graph.upsert_node(job)?;

        self.run_index.insert(run_id.to_string(), self.runs.len());
        self.runs.push(RunContext::new(run_id, Some(key), Some(timestamp)));
        Ok(())
    }

    fn on_io_declared(
        &mut self,
        run_id: &str,
        direction: IoDirection,
        namespace: &str,
        name: &str,
        schema: &[SchemaField],
        row_count: Option<u64>,
    ) -> Result<()> {
        self.stats.io_declarations += 1;
        let ds_key = dataset_key(namespace, name);

        let run = match self.run_index.get(run_id) {
            Some(&idx) => Some(idx),
            None => {
                self.warn(BuildWarning::UnknownRun {
                    run_id: run_id.to_string(),
                    event: "io_declared".to_string(),
                });
                None
            }
        };
        let context = match run {
            Some(idx) => self.runs[idx].clone_scope(),
            None => RunContext::new(run_id, None, None),
        };

        let mut dataset = Node::new(&ds_key, NodeKind::Dataset, name, namespace)
            .with_metadata("last_run_id", run_id);
        if let Some(rows) = row_count {
            dataset = dataset.with_metadata("row_count", rows);
        }
        if let Some(ts) = context.started_at {
            dataset = dataset.with_metadata("last_seen", ts.to_rfc3339());
        }
        if !schema.is_empty() {
            let schema_value: Vec<Value> = schema
                .iter()
                .map(|f| json!({ "name": f.name, "type": f.field_type }))
                .collect();
            dataset = dataset
                .with_metadata("schema", schema_value)
                .with_metadata("field_count", schema.len());
        }
        self.graph.upsert_node(dataset)?;

        for (ordinal, column) in schema.iter().enumerate() {
            let key = field_key(&ds_key, &column.name);
            let field = Node::new(&key, NodeKind::Field, &column.name, namespace)
                .with_metadata("dataset", ds_key.as_str())
                .with_metadata("type", column.field_type.as_str())
                .with_metadata("ordinal", ordinal);
            self.graph.upsert_node(field)?;
            self.graph
                .add_edge(context.attribute(Edge::new(&ds_key, &key, Relation::Contains)))?;
        }

        let Some(idx) = run else {
            return Ok(());
        };
        let Some(job) = self.runs[idx].job_key.clone() else {
            return Ok(());
        };
        let edge = match direction {
            IoDirection::In => Edge::new(&ds_key, &job, Relation::Consumes),
            IoDirection::Out => Edge::new(&job, &ds_key, Relation::Produces),
        };
        self.graph.add_edge(context.attribute(edge))?;

        let run = &mut self.runs[idx];
        let side = match direction {
            IoDirection::In => &mut run.inputs,
            IoDirection::Out => &mut run.outputs,
        };
        if !side.contains(&ds_key) {
            side.push(ds_key);
        }
        Ok(())
    }

    fn on_column_lineage(&mut self, run_id: &str, mappings: Vec<ColumnMapping>) -> Result<()> {
        self.stats.column_mappings += mappings.len();
        match self.run_index.get(run_id) {
            Some(&idx) if !self.runs[idx].ended => {
                self.runs[idx].pending.extend(mappings);
                Ok(())
            }
            Some(&idx) => {
                // late lineage for a finished run is resolved right away
                let context = self.runs[idx].clone_scope();
                self.resolve_mappings(&context, mappings)
            }
            None => {
                self.warn(BuildWarning::UnknownRun {
                    run_id: run_id.to_string(),
                    event: "column_lineage_declared".to_string(),
                });
                let context = RunContext::new(run_id, None, None);
                self.resolve_mappings(&context, mappings)
            }
        }
    }

    fn on_run_ended(&mut self, run_id: &str, status: RunStatus, duration_ms: Option<u64>) -> Result<()> {
        let Some(&idx) = self.run_index.get(run_id) else {
            self.warn(BuildWarning::UnknownRun {
                run_id: run_id.to_string(),
                event: "run_ended".to_string(),
            });
            return Ok(());
        };

        match status {
            RunStatus::Completed => self.stats.runs_completed += 1,
            RunStatus::Failed => self.stats.runs_failed += 1,
        }

        if let Some(key) = self.runs[idx].job_key.clone() {
            let (namespace, name) = split_key(&key);
            let mut job = Node::new(&key, NodeKind::Job, name, namespace)
                .with_metadata("status", status.as_str())
                .with_metadata("last_ended_run_id", run_id);
            if let Some(ms) = duration_ms {
                job = job.with_metadata("duration_ms", ms);
            }
            // keep the namespace/name split from RunStarted
            if let Some(existing) = self.graph.node(&key) {
                job.display_name = existing.display_name.clone();
                job.namespace = existing.namespace.clone();
            }
            self.graph.upsert_node(job)?;
        }

        if !self.runs[idx].ended {
            self.flush_run(idx)?;
        }
        Ok(())
    }

    fn flush_run(&mut self, idx: usize) -> Result<()> {
        let pending = std::mem::take(&mut self.runs[idx].pending);
        self.runs[idx].ended = true;
        let context = self.runs[idx].clone_scope();
        self.resolve_mappings(&context, pending)
    }

    fn resolve_mappings(&mut self, context: &RunContext, mappings: Vec<ColumnMapping>) -> Result<()> {
        for mapping in mappings {
            let targets = self.resolve_reference(context, &mapping.downstream, Side::Downstream)?;

            let mut seen = BTreeSet::new();
            for reference in &mapping.upstream {
                if !seen.insert(reference.as_str()) {
                    continue;
                }
                let sources = self.resolve_reference(context, reference, Side::Upstream)?;
                for source in &sources {
                    for target in &targets {
                        let edge = Edge::new(source, target, Relation::Derives)
                            .with_transformation(&mapping.transformation);
                        self.graph.add_edge(context.attribute(edge))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Maps a column reference to field keys, synthesizing an inferred field
    /// when nothing matches.
    fn resolve_reference(&mut self, context: &RunContext, reference: &str, side: Side) -> Result<Vec<String>> {
        let preferred = context.datasets(side);
        let mut candidates = field_candidates(&self.graph, preferred, reference);
        if candidates.is_empty() {
            let all: Vec<String> = context
                .inputs
                .iter()
                .chain(context.outputs.iter())
                .cloned()
                .collect();
            candidates = field_candidates(&self.graph, &all, reference);
        }
        if candidates.is_empty() {
            if let Some(node) = self.graph.node(reference) {
                if node.kind == NodeKind::Field {
                    candidates.push(reference.to_string());
                }
            }
        }

        match candidates.len() {
            0 => Ok(self.infer_field(context, reference, preferred)?.into_iter().collect()),
            1 => Ok(candidates),
            _ => {
                self.warn(BuildWarning::AmbiguousColumnReference {
                    run_id: context.run_id.clone(),
                    reference: reference.to_string(),
                    candidates: candidates.clone(),
                });
                Ok(candidates)
            }
        }
    }

    /// Creates a placeholder field for an unmatched reference. A reference whose
    /// key already names a dataset or job cannot become a field; it is skipped
    /// with a warning.
    fn infer_field(&mut self, context: &RunContext, reference: &str, preferred: &[String]) -> Result<Option<String>> {
        let owner = match preferred {
            [only] if !reference.contains('.') => Some(only.clone()),
            _ => None,
        };

        let key = match &owner {
            Some(ds) => field_key(ds, reference),
            None => reference.to_string(),
        };
        if let Some(existing) = self.graph.node(&key).filter(|n| n.kind != NodeKind::Field) {
            let found = existing.kind;
            self.warn(BuildWarning::UnresolvableColumnReference {
                run_id: context.run_id.clone(),
                reference: reference.to_string(),
                key,
                found,
            });
            return Ok(None);
        }
        let (prefix, name) = split_key(&key);
        let namespace = owner
            .as_deref()
            .and_then(|ds| self.graph.node(ds))
            .map(|ds| ds.namespace.clone())
            .unwrap_or_else(|| prefix.to_string());

        let mut metadata = Metadata::new();
        metadata.insert(META_INFERRED.to_string(), Value::Bool(true));
        if let Some(ds) = &owner {
            metadata.insert("dataset".to_string(), Value::String(ds.clone()));
        }
        let mut field = Node::new(&key, NodeKind::Field, name, namespace);
        field.metadata = metadata;
        self.graph.upsert_node(field)?;

        if let Some(ds) = owner {
            self.graph
                .add_edge(context.attribute(Edge::new(ds, &key, Relation::Contains)))?;
        }

        self.warn(BuildWarning::InferredField {
            run_id: context.run_id.clone(),
            reference: reference.to_string(),
            key: key.clone(),
        });
        Ok(Some(key))
    }

    fn warn(&mut self, warning: BuildWarning) {
        warn!(kind = warning.kind(), "{}", warning);
        observability::record_build_warning(warning.kind());
        self.warnings.push(warning);
    }
}

impl RunContext {
    /// Copy of the run's scope without its pending mappings.
    fn clone_scope(&self) -> RunContext {
        RunContext {
            run_id: self.run_id.clone(),
            job_key: self.job_key.clone(),
            started_at: self.started_at,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            pending: Vec::new(),
            ended: self.ended,
        }
    }
}

/// Fields of the given datasets whose key is `reference` or ends with
/// `.reference`, sorted.
fn field_candidates(graph: &LineageGraph, datasets: &[String], reference: &str) -> Vec<String> {
    let suffix = format!(".{}", reference);
    let mut found: BTreeSet<String> = BTreeSet::new();
    for ds in datasets {
        for field in graph.fields_of(ds) {
            if field.key == reference || field.key.ends_with(&suffix) {
                found.insert(field.key.clone());
            }
        }
    }
    found.into_iter().collect()
}
