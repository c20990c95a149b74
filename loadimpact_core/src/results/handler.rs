//! Change handler trait and built-in handlers.
//!
//! Handlers receive every change set a traversal yields when it is run with
//! [`Iterate::drive`](super::stream::Iterate::drive).

use super::types::{ChangeSet, DataPoint, StreamState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Receives the change sets of a driven traversal.
pub trait ChangeHandler: Send + Sync {
    fn handle(&self, changes: &ChangeSet);

    /// Flush any buffered output.
    fn flush(&self) {}

    /// Called before the first poll with the source label, e.g. `test 42`.
    fn on_start(&self, _source: &str) {}

    /// Called once the traversal ends, with its final state.
    fn on_end(&self, _source: &str, _state: &StreamState) {}
}

/// One changed metric of one poll cycle, as written by [`JsonHandler`].
#[derive(Debug, Serialize)]
struct MetricLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    cycle: u64,
    observed_at: DateTime<Utc>,
    metric: &'a str,
    offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a Value>,
    data: &'a Value,
}

/// Writes one JSON line per changed metric, to stdout or appended to a file.
///
/// Lines carry the source label seen in [`ChangeHandler::on_start`], so a
/// file shared by several streams stays readable.
pub struct JsonHandler {
    output_path: Option<PathBuf>,
    file: Mutex<Option<std::fs::File>>,
    source: Mutex<Option<String>>,
}

impl JsonHandler {
    pub fn stdout() -> Self {
        Self {
            output_path: None,
            file: Mutex::new(None),
            source: Mutex::new(None),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: Some(path.into()),
            file: Mutex::new(None),
            source: Mutex::new(None),
        }
    }

    fn render(&self, changes: &ChangeSet) -> Vec<String> {
        let source = self.source.lock().clone();
        changes
            .changes
            .iter()
            .filter_map(|(metric, point)| {
                let line = metric_line(source.as_deref(), changes, metric, point);
                match serde_json::to_string(&line) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        warn!(metric = %metric, error = %e, "failed to serialize metric change");
                        None
                    }
                }
            })
            .collect()
    }

    fn write_lines(&self, lines: &[String]) {
        let Some(ref path) = self.output_path else {
            for line in lines {
                println!("{}", line);
            }
            return;
        };

        let mut guard = self.file.lock();
        if guard.is_none() {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => *guard = Some(f),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to open change log");
                    return;
                }
            }
        }
        if let Some(ref mut file) = *guard {
            for line in lines {
                if let Err(e) = writeln!(file, "{}", line) {
                    warn!(path = %path.display(), error = %e, "failed to write metric change");
                    return;
                }
            }
        }
    }
}

fn metric_line<'a>(
    source: Option<&'a str>,
    changes: &ChangeSet,
    metric: &'a str,
    point: &'a DataPoint,
) -> MetricLine<'a> {
    MetricLine {
        source,
        cycle: changes.cycle,
        observed_at: changes.observed_at,
        metric,
        offset: point.offset,
        timestamp: point.timestamp.as_ref(),
        data: &point.data,
    }
}

impl ChangeHandler for JsonHandler {
    fn handle(&self, changes: &ChangeSet) {
        let lines = self.render(changes);
        if !lines.is_empty() {
            self.write_lines(&lines);
        }
    }

    fn flush(&self) {
        if let Some(ref mut file) = *self.file.lock() {
            let _ = file.flush();
        }
    }

    fn on_start(&self, source: &str) {
        *self.source.lock() = Some(source.to_string());
    }
}

/// A handler that keeps change sets in memory.
///
/// With a maximum size the oldest change sets are dropped first.
pub struct BufferedHandler {
    changes: Mutex<VecDeque<ChangeSet>>,
    max_size: Option<usize>,
}

impl BufferedHandler {
    pub fn new() -> Self {
        Self {
            changes: Mutex::new(VecDeque::new()),
            max_size: None,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            changes: Mutex::new(VecDeque::with_capacity(max_size.min(1000))),
            max_size: Some(max_size),
        }
    }

    /// Buffered change sets, oldest first.
    pub fn changes(&self) -> Vec<ChangeSet> {
        self.changes.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.changes.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.changes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BufferedHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHandler for BufferedHandler {
    fn handle(&self, changes: &ChangeSet) {
        let mut buffer = self.changes.lock();
        if let Some(max) = self.max_size {
            if max == 0 {
                return;
            }
            while buffer.len() >= max {
                buffer.pop_front();
            }
        }
        buffer.push_back(changes.clone());
    }
}
