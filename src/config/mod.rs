//! Configuration module for Tributary.

use crate::error::{Result, TributaryError};
use crate::lineage::ExportFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration for an analysis session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TributaryConfig {
    /// Where lineage events are read from.
    pub events: EventSourceConfig,
    /// Query defaults.
    pub query: QueryConfig,
    /// Export defaults.
    pub export: ExportConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl TributaryConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TributaryError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            TributaryError::Config(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.events.path.as_os_str().is_empty() {
            return Err(TributaryError::InvalidConfig {
                field: "events.path".to_string(),
                reason: "Event log path must not be empty".to_string(),
            });
        }

        let level = self.observability.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(TributaryError::InvalidConfig {
                field: "observability.log_level".to_string(),
                reason: format!("Unknown log level '{}'", self.observability.log_level),
            });
        }

        Ok(())
    }

    /// Create a development configuration: local event log, verbose logs.
    pub fn development() -> Self {
        Self {
            events: EventSourceConfig {
                path: PathBuf::from("lineage_events.jsonl"),
                skip_invalid_lines: true,
            },
            query: QueryConfig::default(),
            export: ExportConfig {
                format: ExportFormat::Json,
                pretty: true,
            },
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
            },
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSourceConfig {
    /// JSON Lines file with one event per line.
    pub path: PathBuf,
    /// Log and skip malformed lines instead of failing the build.
    pub skip_invalid_lines: bool,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lineage_events.jsonl"),
            skip_invalid_lines: false,
        }
    }
}

/// Query configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Depth bound for trace and impact queries; `None` is unbounded.
    pub default_max_depth: Option<usize>,
}

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,
    /// Pretty-print JSON documents.
    pub pretty: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            pretty: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TributaryConfig::default();
        assert_eq!(config.events.path, PathBuf::from("lineage_events.jsonl"));
        assert_eq!(config.query.default_max_depth, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = TributaryConfig::development();
        assert!(config.events.skip_invalid_lines);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"events": {{"path": "/data/lineage.jsonl"}}, "query": {{"default_max_depth": 4}}, "export": {{"format": "mermaid"}}}}"#
        )
        .unwrap();

        let config = TributaryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.events.path, PathBuf::from("/data/lineage.jsonl"));
        assert!(!config.events.skip_invalid_lines);
        assert_eq!(config.query.default_max_depth, Some(4));
        assert_eq!(config.export.format, ExportFormat::Mermaid);
        assert!(config.export.pretty);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = TributaryConfig::default();
        config.observability.log_level = "loud".to_string();
        match config.validate() {
            Err(TributaryError::InvalidConfig { field, .. }) => assert_eq!(field, "observability.log_level"),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_events_path() {
        let mut config = TributaryConfig::default();
        config.events.path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = TributaryConfig::from_file(Path::new("/nonexistent/tributary.json")).unwrap_err();
        assert!(matches!(err, TributaryError::Config(_)));
    }
}
