//! Scenario validation log stream.
//!
//! A validation run reports log entries with increasing offsets. The stream
//! asks for entries past the last offset it has seen, yields them one by
//! one, and ends once the validation reaches a terminal status.

use super::options::StreamOptions;
use super::types::INITIAL_OFFSET;
use crate::errors::CoreError;
use crate::jobs::ValidationStatus;
use crate::polling::PollState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Envelope key of validation results in enveloped responses.
const RESULTS_ENVELOPE: &str = "user_scenario_validation_results";

/// One validation log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub offset: i64,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Remaining fields as sent by the API.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of validation results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPage {
    /// Status reported alongside the entries, if the API sent one.
    pub status: Option<ValidationStatus>,
    pub entries: Vec<LogEntry>,
}

impl LogPage {
    /// Parse `{status, results: [...]}` or
    /// `{user_scenario_validation_results: [...]}`.
    ///
    /// Entries without an integer offset are skipped. A body that is not an
    /// object, or whose result list is not a list, is a protocol error.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let Some(map) = value.as_object() else {
            return Err(CoreError::protocol("expected validation results object"));
        };

        let status = map
            .get("status")
            .and_then(Value::as_i64)
            .map(ValidationStatus::from_code);

        let entries = match map.get("results").or_else(|| map.get(RESULTS_ENVELOPE)) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match serde_json::from_value::<LogEntry>(item.clone()) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        debug!(error = %e, "skipping malformed validation log entry");
                        None
                    }
                })
                .collect(),
            Some(_) => return Err(CoreError::protocol("validation results are not a list")),
        };

        Ok(Self { status, entries })
    }
}

/// Validation whose log can be streamed.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch log entries past `offset`.
    async fn fetch_log(&self, offset: i64) -> Result<LogPage, CoreError>;

    /// Current status, used when a page carries none.
    async fn status(&self) -> Result<ValidationStatus, CoreError>;

    fn label(&self) -> String {
        "validation".to_string()
    }
}

#[async_trait]
impl<S: LogSource + ?Sized> LogSource for Arc<S> {
    async fn fetch_log(&self, offset: i64) -> Result<LogPage, CoreError> {
        (**self).fetch_log(offset).await
    }

    async fn status(&self) -> Result<ValidationStatus, CoreError> {
        (**self).status().await
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

/// Streams a validation's log entries until it finishes or fails.
pub struct ValidationLogStream<S> {
    source: S,
    options: StreamOptions,
    last_offset: i64,
    status: ValidationStatus,
    results: Vec<LogEntry>,
    pending: VecDeque<LogEntry>,
    polls: u64,
    poll: PollState,
    started: Option<Instant>,
    finished: bool,
    cancel: CancellationToken,
}

impl<S: LogSource> ValidationLogStream<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, StreamOptions::default())
    }

    pub fn with_options(source: S, options: StreamOptions) -> Self {
        let poll = PollState::new(options.poll_config());
        Self {
            source,
            options,
            last_offset: INITIAL_OFFSET,
            status: ValidationStatus::Queued,
            results: Vec::new(),
            pending: VecDeque::new(),
            polls: 0,
            poll,
            started: None,
            finished: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self.poll = PollState::new(self.options.poll_config());
        self
    }

    pub fn max_polls(mut self, max: u64) -> Self {
        self.options.max_polls = Some(max);
        self
    }

    pub fn max_duration(mut self, max: Duration) -> Self {
        self.options.max_duration = Some(max);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Status reported by the last poll.
    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn last_offset(&self) -> i64 {
        self.last_offset
    }

    /// Every entry received so far.
    pub fn results(&self) -> &[LogEntry] {
        &self.results
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Next log entry, `None` once the validation is over.
    pub async fn next(&mut self) -> Option<Result<LogEntry, CoreError>> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }
            if self.finished {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finish("cancelled");
                return None;
            }
            let started = *self.started.get_or_insert_with(Instant::now);

            if let Some(max) = self.options.max_polls {
                if self.polls >= max {
                    self.finish("budget exceeded");
                    return Some(Err(CoreError::timeout(format!(
                        "validation log reached max_polls ({})",
                        max
                    ))));
                }
            }

            if self.polls > 0 {
                let delay = self.poll.next_delay();
                let cancel = self.cancel.clone();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.finish("cancelled");
                        return None;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if let Some(max) = self.options.max_duration {
                if started.elapsed() >= max {
                    self.finish("budget exceeded");
                    return Some(Err(CoreError::timeout(format!(
                        "validation log exceeded max_duration ({:?})",
                        max
                    ))));
                }
            }

            self.polls += 1;
            if let Err(err) = self.poll_once().await {
                self.finish("error");
                return Some(Err(err));
            }
        }
    }

    async fn poll_once(&mut self) -> Result<(), CoreError> {
        let page = match self.source.fetch_log(self.last_offset).await {
            Ok(page) => page,
            Err(err) if self.tolerates(&err) => return self.tolerate(err),
            Err(err) => return Err(err),
        };

        let status = match page.status {
            Some(status) => status,
            None => match self.source.status().await {
                Ok(status) => status,
                Err(err) if self.tolerates(&err) => return self.tolerate(err),
                Err(err) => return Err(err),
            },
        };
        self.poll.record_success();

        let mut fresh = 0;
        for entry in page.entries {
            if entry.offset <= self.last_offset {
                continue;
            }
            self.last_offset = entry.offset;
            self.results.push(entry.clone());
            self.pending.push_back(entry);
            fresh += 1;
        }

        if status != self.status {
            info!(source = %self.source.label(), status = %status, "validation status changed");
        }
        self.status = status;
        debug!(poll = self.polls, fresh, status = %status, "validation log polled");

        if status.is_terminal() {
            self.finish("validation done");
        }
        Ok(())
    }

    fn tolerates(&self, err: &CoreError) -> bool {
        !self.options.propagate_errors && err.is_transport()
    }

    fn tolerate(&mut self, err: CoreError) -> Result<(), CoreError> {
        warn!(poll = self.polls, error = %err, "validation poll failed, retrying");
        self.poll.record_error();
        if self.poll.should_give_up() {
            return Err(err);
        }
        Ok(())
    }

    fn finish(&mut self, reason: &str) {
        info!(
            source = %self.source.label(),
            polls = self.polls,
            entries = self.results.len(),
            reason,
            "validation log stream stopped"
        );
        self.finished = true;
    }
}
