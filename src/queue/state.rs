use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job as recorded by the result backend.
///
/// `Pending` is never written: a job that has no record yet is pending.
/// Workers report `Processing` (or a task-specific `Custom` state) while
/// running and finish in exactly one of `Success` or `Failure`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Pending,
    Processing,
    Success,
    Failure,
    /// Any other state a task chooses to report, stored upper-cased
    Custom(String),
}

impl JobState {
    /// Parse a stored state string (case-insensitive)
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "PENDING" => JobState::Pending,
            "PROCESSING" => JobState::Processing,
            "SUCCESS" => JobState::Success,
            "FAILURE" => JobState::Failure,
            _ => JobState::Custom(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Processing => "PROCESSING",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Custom(state) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    /// Whether a job currently in `self` may move to `next`.
    ///
    /// Terminal states are final, and nothing moves back to `Pending`.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        !self.is_terminal() && *next != JobState::Pending
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        JobState::parse(&raw)
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}
