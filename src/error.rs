//! Error types for the Tributary lineage engine.
//!
//! This module provides a unified error type [`TributaryError`] for all engine
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Caller errors**: a query referenced a node that does not exist, or a
//!   bare name that matches several nodes. Fatal to the query, not the engine.
//! - **Invariant violations**: the event source produced something that cannot
//!   be interpreted (e.g. a key observed as both a dataset and a field).
//!   These abort the build.
//! - **Input/Configuration**: unreadable event logs, malformed lines, bad
//!   configuration files.
//!
//! Data-quality findings (unknown runs, inferred fields, cycles, orphans) are
//! not errors; they are returned as values by the builder and validator.
//!
//! # Example
//!
//! ```rust
//! use tributary::error::{Result, TributaryError};
//!
//! fn lookup(key: &str) -> Result<()> {
//!     if key.is_empty() {
//!         return Err(TributaryError::NotFound(key.to_string()));
//!     }
//!     Ok(())
//! }
//!
//! let err = lookup("").unwrap_err();
//! assert!(err.is_caller_error());
//! assert_eq!(err.exit_code(), 2);
//! ```

use std::io;
use thiserror::Error;

/// Main error type for Tributary operations.
#[derive(Error, Debug)]
pub enum TributaryError {
    // Query errors
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Ambiguous reference '{reference}': matches {}", candidates.join(", "))]
    AmbiguousReference {
        reference: String,
        candidates: Vec<String>,
    },

    // Build errors
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid event at line {line}: {reason}")]
    InvalidEvent { line: usize, reason: String },

    // Export errors
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TributaryError {
    /// True for errors caused by the query the caller issued.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            TributaryError::NotFound(_) | TributaryError::AmbiguousReference { .. }
        )
    }

    /// True when the event source violated a structural contract.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, TributaryError::InvariantViolation(_))
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        if self.is_caller_error() {
            2
        } else {
            1
        }
    }
}

impl From<serde_json::Error> for TributaryError {
    fn from(e: serde_json::Error) -> Self {
        TributaryError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for TributaryError {
    fn from(e: serde_yaml::Error) -> Self {
        TributaryError::Serialization(e.to_string())
    }
}

/// Result type alias for Tributary operations.
pub type Result<T> = std::result::Result<T, TributaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_lists_candidates() {
        let err = TributaryError::AmbiguousReference {
            reference: "customer_id".to_string(),
            candidates: vec![
                "raw.archived_orders.customer_id".to_string(),
                "raw.orders.customer_id".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("customer_id"));
        assert!(msg.contains("raw.archived_orders.customer_id, raw.orders.customer_id"));
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(TributaryError::NotFound("x".into()).exit_code(), 2);
        assert_eq!(TributaryError::InvariantViolation("x".into()).exit_code(), 1);
        assert_eq!(TributaryError::Internal("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_serde_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: TributaryError = parse.unwrap_err().into();
        assert!(matches!(err, TributaryError::Serialization(_)));
    }
}
