use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::queue::{JobRecord, JobState, TaskMessage};

/// Database representation of a queued task message
#[derive(Debug, FromRow)]
pub struct QueueRow {
    pub id: Uuid,
    pub task_name: String,
    pub queue: String,
    pub args: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl From<QueueRow> for TaskMessage {
    fn from(row: QueueRow) -> Self {
        TaskMessage {
            id: row.id,
            task: row.task_name,
            queue: row.queue,
            args: row.args,
            enqueued_at: row.enqueued_at,
        }
    }
}

/// Database representation of a job's recorded state
#[derive(Debug, FromRow)]
pub struct ResultRow {
    pub id: Uuid,
    pub state: String,
    pub info: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl From<ResultRow> for JobRecord {
    fn from(row: ResultRow) -> Self {
        JobRecord {
            id: row.id,
            state: JobState::parse(&row.state),
            info: row.info,
            updated_at: row.updated_at,
        }
    }
}
