//! Lineage event model.
//!
//! A pipeline run emits four kinds of facts: it started, it read or wrote a
//! dataset, it derived some columns from others, and it ended. The engine
//! folds these into a [`LineageGraph`](crate::lineage::LineageGraph); it never
//! sees the pipeline's business logic.
//!
//! Events serialize as internally tagged JSON objects:
//!
//! ```json
//! {"type":"run_started","run_id":"r1","job_namespace":"ecommerce","job_name":"etl_orders","timestamp":"2024-01-01T00:00:00Z"}
//! ```

pub mod source;

pub use source::{EventSource, JsonLinesSource, MemorySource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a dataset relative to the run that declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IoDirection {
    In,
    Out,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a declared dataset schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Column-level derivation declared by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Field whose value is computed.
    pub downstream: String,
    /// Fields the value is computed from. Duplicates are ignored.
    pub upstream: Vec<String>,
    /// Human-readable description of the computation.
    #[serde(default)]
    pub transformation: String,
}

impl ColumnMapping {
    pub fn new<I, S>(downstream: impl Into<String>, upstream: I, transformation: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            downstream: downstream.into(),
            upstream: upstream.into_iter().map(Into::into).collect(),
            transformation: transformation.into(),
        }
    }
}

/// A single immutable lineage fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        run_id: String,
        job_namespace: String,
        job_name: String,
        timestamp: DateTime<Utc>,
    },
    IoDeclared {
        run_id: String,
        direction: IoDirection,
        dataset_namespace: String,
        dataset_name: String,
        #[serde(default)]
        schema: Vec<SchemaField>,
        #[serde(default)]
        row_count: Option<u64>,
    },
    ColumnLineageDeclared {
        run_id: String,
        mappings: Vec<ColumnMapping>,
    },
    RunEnded {
        run_id: String,
        status: RunStatus,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
}

impl Event {
    pub fn run_id(&self) -> &str {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::IoDeclared { run_id, .. }
            | Event::ColumnLineageDeclared { run_id, .. }
            | Event::RunEnded { run_id, .. } => run_id,
        }
    }

    /// Stable name of the event variant, used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run_started",
            Event::IoDeclared { .. } => "io_declared",
            Event::ColumnLineageDeclared { .. } => "column_lineage_declared",
            Event::RunEnded { .. } => "run_ended",
        }
    }

    pub fn run_started(
        run_id: impl Into<String>,
        job_namespace: impl Into<String>,
        job_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::RunStarted {
            run_id: run_id.into(),
            job_namespace: job_namespace.into(),
            job_name: job_name.into(),
            timestamp,
        }
    }

    pub fn io(
        run_id: impl Into<String>,
        direction: IoDirection,
        dataset_namespace: impl Into<String>,
        dataset_name: impl Into<String>,
        schema: Vec<SchemaField>,
        row_count: Option<u64>,
    ) -> Self {
        Event::IoDeclared {
            run_id: run_id.into(),
            direction,
            dataset_namespace: dataset_namespace.into(),
            dataset_name: dataset_name.into(),
            schema,
            row_count,
        }
    }

    pub fn column_lineage(run_id: impl Into<String>, mappings: Vec<ColumnMapping>) -> Self {
        Event::ColumnLineageDeclared {
            run_id: run_id.into(),
            mappings,
        }
    }

    pub fn run_ended(run_id: impl Into<String>, status: RunStatus, duration_ms: Option<u64>) -> Self {
        Event::RunEnded {
            run_id: run_id.into(),
            status,
            duration_ms,
        }
    }
}
