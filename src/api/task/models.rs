use serde_json::{json, Value};

use crate::queue::{JobRecord, JobState};

/// Content types accepted by the upload endpoint
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["application/pdf", "message/rfc822"];

pub fn is_supported_content_type(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES.contains(&content_type)
}

/// A document received by the upload endpoint
#[derive(Debug, Clone, Copy)]
pub struct UploadedFile<'a> {
    pub bytes: &'a [u8],
    pub content_type: Option<&'a str>,
    pub filename: Option<&'a str>,
}

/// Client-facing view of a job's state
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Unclaimed, or unknown to the result backend
    Pending,
    Processing(Option<Value>),
    Completed(Option<Value>),
    Failed(String),
    /// A state reported by a task that has no dedicated mapping
    Other { state: String, info: Option<Value> },
}

impl TaskStatus {
    /// Map a result backend record (or its absence) to the API view
    pub fn from_record(record: Option<JobRecord>) -> Self {
        let Some(record) = record else {
            return TaskStatus::Pending;
        };

        match record.state {
            JobState::Pending => TaskStatus::Pending,
            JobState::Processing => TaskStatus::Processing(record.info),
            JobState::Success => TaskStatus::Completed(record.info),
            JobState::Failure => TaskStatus::Failed(match record.info {
                Some(Value::String(message)) => message,
                Some(other) => other.to_string(),
                None => "Task failed".to_string(),
            }),
            JobState::Custom(state) => TaskStatus::Other {
                state,
                info: record.info,
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            TaskStatus::Pending => "pending".to_string(),
            TaskStatus::Processing(_) => "processing".to_string(),
            TaskStatus::Completed(_) => "completed".to_string(),
            TaskStatus::Failed(_) => "failed".to_string(),
            TaskStatus::Other { state, .. } => state.to_lowercase(),
        }
    }

    /// The `result` field of the status response
    pub fn into_result(self) -> Option<Value> {
        match self {
            TaskStatus::Pending => None,
            TaskStatus::Processing(info) | TaskStatus::Completed(info) => info,
            TaskStatus::Failed(message) => Some(json!({ "error": message })),
            TaskStatus::Other { info, .. } => info,
        }
    }
}
