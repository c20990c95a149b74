//! Stream options.

use crate::config::StreamDefaults;
use crate::polling::PollConfig;
use std::time::Duration;

/// Default delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default number of polls made after the stream settles.
pub const DEFAULT_GRACE_POLLS: u32 = 5;

/// Default consecutive failures tolerated when errors are not propagated.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Options for a result or validation log stream.
///
/// Every traversal starts from the stream's options; the `Iterate` builder
/// can override them per traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Polls made once the job is done and results are stable.
    pub grace_polls: u32,
    /// When false, transport failures of a status check count as "not done"
    /// and failed fetches as "no data this cycle".
    pub propagate_errors: bool,
    /// Tolerated consecutive failed cycles before the last error is returned.
    pub max_consecutive_errors: u32,
    /// Upper bound on poll cycles per traversal.
    pub max_polls: Option<u64>,
    /// Upper bound on wall time per traversal.
    pub max_duration: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_polls: DEFAULT_GRACE_POLLS,
            propagate_errors: true,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            max_polls: None,
            max_duration: None,
        }
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn grace_polls(mut self, grace_polls: u32) -> Self {
        self.grace_polls = grace_polls;
        self
    }

    pub fn propagate_errors(mut self, propagate: bool) -> Self {
        self.propagate_errors = propagate;
        self
    }

    /// Shorthand for `propagate_errors(false)`.
    pub fn tolerant(self) -> Self {
        self.propagate_errors(false)
    }

    pub fn max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn max_polls(mut self, max: u64) -> Self {
        self.max_polls = Some(max);
        self
    }

    pub fn max_duration(mut self, max: Duration) -> Self {
        self.max_duration = Some(max);
        self
    }

    pub(crate) fn poll_config(&self) -> PollConfig {
        PollConfig::with_interval(self.poll_interval, self.max_consecutive_errors.max(1))
    }
}

impl From<&StreamDefaults> for StreamOptions {
    fn from(defaults: &StreamDefaults) -> Self {
        Self {
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            grace_polls: defaults.grace_polls,
            propagate_errors: defaults.propagate_errors,
            max_consecutive_errors: defaults.max_consecutive_errors,
            max_polls: None,
            max_duration: None,
        }
    }
}
