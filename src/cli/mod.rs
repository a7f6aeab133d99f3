//! Command-line interface for Tributary.

pub mod output;

use crate::config::TributaryConfig;
use crate::error::Result;
use crate::lineage::ExportFormat;
use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;

/// Tributary - lineage graph and impact analysis for data pipelines.
#[derive(Debug, Parser)]
#[command(name = "tributary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TRIBUTARY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lineage event log (JSON Lines)
    #[arg(short, long, env = "TRIBUTARY_EVENTS")]
    pub events: Option<PathBuf>,

    /// Skip malformed event lines instead of failing
    #[arg(long)]
    pub skip_invalid: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TRIBUTARY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Trace everything that contributes to a dataset, field or job
    Trace {
        /// Node key or unambiguous suffix (e.g. `net_amount`)
        reference: String,

        /// Maximum depth to traverse
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// List everything downstream of a node
    Impact {
        /// Node key or unambiguous suffix
        reference: String,

        /// Maximum depth to traverse
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Find the shortest lineage path between two nodes
    Path {
        from: String,
        to: String,

        /// Maximum path length in edges
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// List every upstream path from a node back to its sources
    Paths {
        /// Node key or unambiguous suffix
        reference: String,

        /// Maximum path length in edges
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Check the graph for cycles, orphans and dangling edges
    Validate {
        /// Exit non-zero when there are any findings
        #[arg(long)]
        strict: bool,
    },

    /// Export the whole graph
    Export {
        /// Document format (defaults to the configured format)
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Loads the configuration file (or defaults) and applies flag overrides.
    pub fn load_config(&self) -> Result<TributaryConfig> {
        let mut config = match &self.config {
            Some(path) => TributaryConfig::from_file(path)?,
            None => TributaryConfig::default(),
        };

        if let Some(events) = &self.events {
            config.events.path = events.clone();
        }
        if self.skip_invalid {
            config.events.skip_invalid_lines = true;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace() {
        let cli = Cli::try_parse_from(["tributary", "--events", "e.jsonl", "trace", "net_amount", "--depth", "2"])
            .unwrap();
        match cli.command {
            Commands::Trace { reference, depth } => {
                assert_eq!(reference, "net_amount");
                assert_eq!(depth, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.events, Some(PathBuf::from("e.jsonl")));
        assert_eq!(cli.output, OutputFormat::Table);
    }

    #[test]
    fn test_parse_paths() {
        let cli = Cli::try_parse_from(["tributary", "paths", "estimated_profit", "-d", "3"]).unwrap();
        match cli.command {
            Commands::Paths { reference, depth } => {
                assert_eq!(reference, "estimated_profit");
                assert_eq!(depth, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_export_format() {
        let cli = Cli::try_parse_from(["tributary", "-o", "json", "export", "--format", "mermaid"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Export { format, output } => {
                assert_eq!(format, Some(ExportFormat::Mermaid));
                assert!(output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "tributary",
            "--events",
            "/tmp/run.jsonl",
            "--skip-invalid",
            "--log-level",
            "debug",
            "validate",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.events.path, PathBuf::from("/tmp/run.jsonl"));
        assert!(config.events.skip_invalid_lines);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let cli = Cli::try_parse_from(["tributary", "--log-level", "chatty", "validate"]).unwrap();
        assert!(cli.load_config().is_err());
    }
}
