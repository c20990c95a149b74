//! Job status codes.
//!
//! Tests and scenario validations report their lifecycle as integer codes.
//! The enums here map those codes, tell terminal states apart, and carry the
//! human-readable status text the API uses.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TestStatus {
    Created,
    Queued,
    Initializing,
    Running,
    Finished,
    TimedOut,
    AbortingUser,
    AbortedUser,
    AbortingSystem,
    AbortedSystem,
    /// A code this SDK does not know about.
    Unknown(i64),
}

impl TestStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => TestStatus::Created,
            0 => TestStatus::Queued,
            1 => TestStatus::Initializing,
            2 => TestStatus::Running,
            3 => TestStatus::Finished,
            4 => TestStatus::TimedOut,
            5 => TestStatus::AbortingUser,
            6 => TestStatus::AbortedUser,
            7 => TestStatus::AbortingSystem,
            8 => TestStatus::AbortedSystem,
            other => TestStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            TestStatus::Created => -1,
            TestStatus::Queued => 0,
            TestStatus::Initializing => 1,
            TestStatus::Running => 2,
            TestStatus::Finished => 3,
            TestStatus::TimedOut => 4,
            TestStatus::AbortingUser => 5,
            TestStatus::AbortedUser => 6,
            TestStatus::AbortingSystem => 7,
            TestStatus::AbortedSystem => 8,
            TestStatus::Unknown(code) => *code,
        }
    }

    /// Check if this is a terminal (final) status.
    ///
    /// Aborting states are not terminal: the test still produces results
    /// until the abort completes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::Finished
                | TestStatus::TimedOut
                | TestStatus::AbortedUser
                | TestStatus::AbortedSystem
        )
    }

    pub fn is_success(&self) -> bool {
        *self == TestStatus::Finished
    }

    /// Status text as shown by the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Created => "created",
            TestStatus::Queued => "queued",
            TestStatus::Initializing => "initializing",
            TestStatus::Running => "running",
            TestStatus::Finished => "finished",
            TestStatus::TimedOut => "timed out",
            TestStatus::AbortingUser => "aborting (by user)",
            TestStatus::AbortedUser => "aborted (by user)",
            TestStatus::AbortingSystem => "aborting (by system)",
            TestStatus::AbortedSystem => "aborted (by system)",
            TestStatus::Unknown(_) => "unknown",
        }
    }
}

impl From<i64> for TestStatus {
    fn from(code: i64) -> Self {
        TestStatus::from_code(code)
    }
}

impl From<TestStatus> for i64 {
    fn from(status: TestStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for TestStatus {
    fn default() -> Self {
        TestStatus::Created
    }
}

/// Lifecycle status of a user scenario validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ValidationStatus {
    Queued,
    Initializing,
    Running,
    Finished,
    Failed,
    Unknown(i64),
}

impl ValidationStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ValidationStatus::Queued,
            1 => ValidationStatus::Initializing,
            2 => ValidationStatus::Running,
            3 => ValidationStatus::Finished,
            4 => ValidationStatus::Failed,
            other => ValidationStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ValidationStatus::Queued => 0,
            ValidationStatus::Initializing => 1,
            ValidationStatus::Running => 2,
            ValidationStatus::Finished => 3,
            ValidationStatus::Failed => 4,
            ValidationStatus::Unknown(code) => *code,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationStatus::Finished | ValidationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Queued => "queued",
            ValidationStatus::Initializing => "initializing",
            ValidationStatus::Running => "running",
            ValidationStatus::Finished => "finished",
            ValidationStatus::Failed => "failed",
            ValidationStatus::Unknown(_) => "unknown",
        }
    }
}

impl From<i64> for ValidationStatus {
    fn from(code: i64) -> Self {
        ValidationStatus::from_code(code)
    }
}

impl From<ValidationStatus> for i64 {
    fn from(status: ValidationStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ValidationStatus {
    fn default() -> Self {
        ValidationStatus::Queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_test_statuses() {
        let terminal: Vec<i64> = (-1..=8)
            .filter(|c| TestStatus::from_code(*c).is_terminal())
            .collect();
        assert_eq!(terminal, vec![3, 4, 6, 8]);
        assert!(!TestStatus::Unknown(42).is_terminal());
    }

    #[test]
    fn test_status_codes_round_trip() {
        for code in -1..=8 {
            assert_eq!(TestStatus::from_code(code).code(), code);
        }
        assert_eq!(TestStatus::from_code(99), TestStatus::Unknown(99));
    }

    #[test]
    fn test_status_text() {
        assert_eq!(TestStatus::AbortedUser.as_str(), "aborted (by user)");
        assert_eq!(TestStatus::TimedOut.to_string(), "timed out");
        assert_eq!(TestStatus::Unknown(12).as_str(), "unknown");
    }

    #[test]
    fn test_serde_as_integer() {
        let status: TestStatus = serde_json::from_str("2").unwrap();
        assert_eq!(status, TestStatus::Running);
        assert_eq!(serde_json::to_string(&TestStatus::Finished).unwrap(), "3");

        let status: ValidationStatus = serde_json::from_str("4").unwrap();
        assert_eq!(status, ValidationStatus::Failed);
    }

    #[test]
    fn test_validation_terminal() {
        assert!(ValidationStatus::Finished.is_terminal());
        assert!(ValidationStatus::Failed.is_terminal());
        assert!(!ValidationStatus::Running.is_terminal());
        assert!(!ValidationStatus::Unknown(7).is_terminal());
    }
}
