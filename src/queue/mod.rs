//! Job store: the broker that holds queued task messages and the result
//! backend that records job state, both keyed by job id.

pub mod memory;
pub mod state;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::{
    connection,
    job_store::{PgBroker, PgResultBackend},
};
use crate::tasks::queue_for;
pub use memory::MemoryStore;
pub use state::JobState;

/// Errors raised by broker and result backend implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Job {0} has already been enqueued")]
    DuplicateJob(Uuid),

    #[error("State {state} cannot be reported for job {id}")]
    InvalidState { id: Uuid, state: JobState },

    #[error("Unsupported store URL '{0}': expected memory:// or postgres://")]
    UnsupportedUrl(String),
}

/// A unit of work waiting in the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: Uuid,
    pub task: String,
    pub queue: String,
    /// Positional task arguments as a JSON array
    pub args: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskMessage {
    /// Build a message routed to the queue configured for `task`
    pub fn new(id: Uuid, task: &str, args: serde_json::Value) -> Self {
        Self {
            id,
            task: task.to_string(),
            queue: queue_for(task).to_string(),
            args,
            enqueued_at: Utc::now(),
        }
    }
}

/// Recorded state of a job that a worker has claimed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub state: JobState,
    /// Progress metadata while running, the task's return value on success,
    /// the error text on failure
    pub info: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Durable queue of task messages
#[async_trait]
pub trait Broker: Send + Sync {
    /// Add a message; fails with `DuplicateJob` if the id was used before
    async fn enqueue(&self, message: &TaskMessage) -> Result<(), StoreError>;

    /// Take the oldest unclaimed message from any of `queues`
    async fn claim(&self, queues: &[String]) -> Result<Option<TaskMessage>, StoreError>;

    /// Whether a message with this id was ever enqueued
    async fn contains(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn close(&self) {}
}

/// Key-value store of job state and results
#[async_trait]
pub trait ResultBackend: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError>;

    /// Record a new state for a job.
    ///
    /// Returns `Ok(false)` without writing when the job already reached a
    /// terminal state. Reporting `Pending` is an `InvalidState` error.
    async fn store(
        &self,
        id: Uuid,
        state: JobState,
        info: Option<serde_json::Value>,
    ) -> Result<bool, StoreError>;

    /// Cheap connectivity check used by the readiness probe
    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self) {}
}

/// Reject states that may never be written to a result backend
pub(crate) fn ensure_reportable(id: Uuid, state: &JobState) -> Result<(), StoreError> {
    if *state == JobState::Pending {
        return Err(StoreError::InvalidState {
            id,
            state: state.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Memory,
    Postgres,
}

impl StoreKind {
    fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("memory://") {
            Ok(StoreKind::Memory)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(StoreKind::Postgres)
        } else {
            Err(StoreError::UnsupportedUrl(url.to_string()))
        }
    }
}

/// Broker and result backend handles shared by the gateway and the workers
#[derive(Clone)]
pub struct JobStore {
    pub broker: Arc<dyn Broker>,
    pub backend: Arc<dyn ResultBackend>,
}

impl JobStore {
    pub fn new(broker: Arc<dyn Broker>, backend: Arc<dyn ResultBackend>) -> Self {
        Self { broker, backend }
    }

    /// A store living entirely in this process
    pub fn in_memory() -> Self {
        let memory = Arc::new(MemoryStore::new());
        Self {
            broker: Arc::clone(&memory) as Arc<dyn Broker>,
            backend: memory as Arc<dyn ResultBackend>,
        }
    }

    /// Connect to the broker and result backend named by their URLs.
    ///
    /// Identical Postgres URLs share one pool. Memory URLs share one
    /// in-process store.
    pub async fn connect(
        broker_url: &str,
        backend_url: &str,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let broker_kind = StoreKind::from_url(broker_url)?;
        let backend_kind = StoreKind::from_url(backend_url)?;
        let memory = Arc::new(MemoryStore::new());

        let mut broker_pool = None;
        let broker: Arc<dyn Broker> = match broker_kind {
            StoreKind::Memory => Arc::clone(&memory) as Arc<dyn Broker>,
            StoreKind::Postgres => {
                let pool = connection::get_connection(broker_url, max_connections).await?;
                broker_pool = Some(pool.clone());
                Arc::new(PgBroker::new(pool))
            }
        };

        let backend: Arc<dyn ResultBackend> = match backend_kind {
            StoreKind::Memory => memory as Arc<dyn ResultBackend>,
            StoreKind::Postgres => {
                let pool = match broker_pool {
                    Some(pool) if backend_url == broker_url => pool,
                    _ => connection::get_connection(backend_url, max_connections).await?,
                };
                Arc::new(PgResultBackend::new(pool))
            }
        };

        info!(
            "Job store connected: broker={:?}, result backend={:?}",
            broker_kind, backend_kind
        );

        Ok(Self { broker, backend })
    }

    pub async fn close(&self) {
        self.broker.close().await;
        self.backend.close().await;
    }
}

/// Whether a URL points at a Postgres database
pub fn is_postgres_url(url: &str) -> bool {
    matches!(StoreKind::from_url(url), Ok(StoreKind::Postgres))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{GENERATE_3D_MODEL, PROCESS_DOCUMENT};

    #[test]
    fn messages_are_routed_by_task_name() {
        let doc = TaskMessage::new(Uuid::new_v4(), PROCESS_DOCUMENT, serde_json::json!([]));
        assert_eq!(doc.queue, "document_processing");

        let model = TaskMessage::new(Uuid::new_v4(), GENERATE_3D_MODEL, serde_json::json!([]));
        assert_eq!(model.queue, "3d_generation");

        let other = TaskMessage::new(Uuid::new_v4(), "cleanup", serde_json::json!([]));
        assert_eq!(other.queue, "default");
    }

    #[test]
    fn store_urls_are_recognised_by_scheme() {
        assert!(is_postgres_url("postgres://user:pw@localhost/jobs"));
        assert!(is_postgres_url("postgresql://localhost/jobs"));
        assert!(!is_postgres_url("memory://"));
        assert!(!is_postgres_url("redis://localhost:6379/0"));
    }

    #[tokio::test]
    async fn connect_rejects_unknown_schemes() {
        let err = JobStore::connect("redis://localhost:6379/0", "memory://", 1)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UnsupportedUrl(_)));
    }

    #[tokio::test]
    async fn memory_urls_share_one_store() {
        let store = JobStore::connect("memory://", "memory://", 1).await.unwrap();
        let id = Uuid::new_v4();
        store
            .broker
            .enqueue(&TaskMessage::new(id, PROCESS_DOCUMENT, serde_json::json!([])))
            .await
            .unwrap();
        assert!(store.broker.contains(id).await.unwrap());
        assert!(store.backend.get(id).await.unwrap().is_none());
    }

    #[test]
    fn pending_is_never_reportable() {
        let id = Uuid::new_v4();
        assert!(ensure_reportable(id, &JobState::Pending).is_err());
        assert!(ensure_reportable(id, &JobState::Processing).is_ok());
    }
}
