use serde::Serialize;
use uuid::Uuid;

use super::models::TaskStatus;
use crate::storage::Artifact;

/// Response for a job accepted by the gateway
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub status: String,
    pub message: String,
}

impl TaskResponse {
    pub fn processing(task_id: Uuid, message: &str) -> Self {
        Self {
            task_id,
            status: "processing".to_string(),
            message: message.to_string(),
        }
    }
}

/// Response for a job status poll
#[derive(Debug, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
}

impl TaskResult {
    pub fn new(task_id: &str, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: status.label(),
            result: status.into_result(),
        }
    }
}

/// Response for the generated model listing
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<Artifact>,
}
