//! Common test utilities for integration tests.

pub mod fixtures;

use std::io::Write;
use tempfile::NamedTempFile;
use tributary::events::Event;
use tributary::lineage::{build, BuildOutput};

// Re-export common types
pub use fixtures::*;

/// Builds the two-pipeline sample history.
pub fn build_sample() -> BuildOutput {
    build(sample_events()).expect("sample events build cleanly")
}

/// Writes events as a JSON Lines log, one event per line.
pub fn write_event_log(events: &[Event]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "# lineage events").unwrap();
    for event in events {
        writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
    }
    file.flush().unwrap();
    file
}
