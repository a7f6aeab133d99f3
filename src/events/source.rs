//! Event sources.
//!
//! The builder consumes events through [`EventSource`], an ordered and
//! restartable sequence. Where the events live (files, a database, a message
//! feed) is the source's concern.

use super::Event;
use crate::error::{Result, TributaryError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Iterator over events read from a source.
pub type EventIter<'a> = Box<dyn Iterator<Item = Result<Event>> + 'a>;

/// Supplies lineage events in a total order that is stable across reads.
pub trait EventSource {
    /// Returns the events from the beginning of the history.
    fn events(&self) -> Result<EventIter<'_>>;
}

/// In-memory event source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    events: Vec<Event>,
}

impl MemorySource {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromIterator<Event> for MemorySource {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl EventSource for MemorySource {
    fn events(&self) -> Result<EventIter<'_>> {
        Ok(Box::new(self.events.iter().cloned().map(Ok)))
    }
}

/// Reads one JSON event per line from a file.
///
/// Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    skip_invalid_lines: bool,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            skip_invalid_lines: false,
        }
    }

    /// Log and skip malformed lines instead of failing.
    pub fn skip_invalid_lines(mut self, skip: bool) -> Self {
        self.skip_invalid_lines = skip;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for JsonLinesSource {
    fn events(&self) -> Result<EventIter<'_>> {
        let file = File::open(&self.path).map_err(|e| {
            TributaryError::Config(format!(
                "Failed to open event log {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!(path = %self.path.display(), "Reading lineage events");

        let skip_invalid = self.skip_invalid_lines;
        let iter = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(idx, line)| {
                let line_no = idx + 1;
                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some(Err(TributaryError::Io(e))),
                };
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return None;
                }
                match serde_json::from_str::<Event>(trimmed) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) if skip_invalid => {
                        warn!(line = line_no, error = %e, "Skipping malformed event");
                        None
                    }
                    Err(e) => Some(Err(TributaryError::InvalidEvent {
                        line: line_no,
                        reason: e.to_string(),
                    })),
                }
            });

        Ok(Box::new(iter))
    }
}
