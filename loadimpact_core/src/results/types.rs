//! Result stream data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Offset recorded for a metric before anything was received.
pub const INITIAL_OFFSET: i64 = -1;

/// One sample of a metric series.
///
/// Only `offset` is interpreted; `timestamp` and `data` are passed through
/// as the API sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub offset: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

impl DataPoint {
    /// Read a numeric field of `data`, e.g. `value` or `aggregate_function`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }

    /// Read a string field of `data`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// Most recent point seen for a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSeen {
    pub offset: i64,
    pub data: Option<DataPoint>,
}

impl Default for LastSeen {
    fn default() -> Self {
        Self {
            offset: INITIAL_OFFSET,
            data: None,
        }
    }
}

/// Last seen point per serialized metric id.
pub type OffsetTable = BTreeMap<String, LastSeen>;

/// Offsets only, as kept in the stability history.
pub type OffsetSnapshot = BTreeMap<String, i64>;

/// Metrics that received new data in one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Poll cycle number within the traversal, starting at 1.
    pub cycle: u64,
    pub observed_at: DateTime<Utc>,
    /// Latest new point per metric id.
    pub changes: BTreeMap<String, DataPoint>,
}

impl ChangeSet {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            observed_at: Utc::now(),
            changes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, id: &str) -> Option<&DataPoint> {
        self.changes.get(id)
    }
}

/// Termination state of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamState {
    /// Job still running or results still moving.
    Polling,
    /// Job done and results stable; `remaining` more polls are made.
    Draining { remaining: u32 },
    /// Traversal finished.
    Stopped,
}

impl StreamState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, StreamState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Polling => "polling",
            StreamState::Draining { .. } => "draining",
            StreamState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Draining { remaining } => write!(f, "draining ({} left)", remaining),
            other => f.write_str(other.as_str()),
        }
    }
}
