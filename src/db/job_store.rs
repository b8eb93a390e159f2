use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::models::{QueueRow, ResultRow};
use crate::queue::{
    ensure_reportable, Broker, JobRecord, JobState, ResultBackend, StoreError, TaskMessage,
};

/// Postgres-backed broker over the `task_queue` table
pub struct PgBroker {
    pool: Pool<Postgres>,
}

impl PgBroker {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn enqueue(&self, message: &TaskMessage) -> Result<(), StoreError> {
        debug!(
            "Enqueueing job: id={}, task={}, queue={}",
            message.id, message.task, message.queue
        );

        let result = sqlx::query(
            r#"
            INSERT INTO task_queue (id, task_name, queue, args, enqueued_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(&message.task)
        .bind(&message.queue)
        .bind(&message.args)
        .bind(message.enqueued_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateJob(message.id));
        }
        Ok(())
    }

    /// Claim the oldest unclaimed message
    ///
    /// `SKIP LOCKED` lets any number of worker processes poll the same
    /// table without handing one message to two of them.
    async fn claim(&self, queues: &[String]) -> Result<Option<TaskMessage>, StoreError> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            UPDATE task_queue
            SET claimed_at = now()
            WHERE id = (
                SELECT id FROM task_queue
                WHERE claimed_at IS NULL AND queue = ANY($1)
                ORDER BY enqueued_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, task_name, queue, args, enqueued_at
            "#,
        )
        .bind(queues)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TaskMessage::from))
    }

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM task_queue WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Postgres-backed result backend over the `task_results` table
pub struct PgResultBackend {
    pool: Pool<Postgres>,
}

impl PgResultBackend {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultBackend for PgResultBackend {
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query_as::<_, ResultRow>(
            "SELECT id, state, info, updated_at FROM task_results WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JobRecord::from))
    }

    async fn store(
        &self,
        id: Uuid,
        state: JobState,
        info: Option<serde_json::Value>,
    ) -> Result<bool, StoreError> {
        ensure_reportable(id, &state)?;

        // The WHERE clause on the conflict branch keeps terminal rows frozen
        let result = sqlx::query(
            r#"
            INSERT INTO task_results (id, state, info, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state, info = EXCLUDED.info, updated_at = now()
            WHERE task_results.state NOT IN ('SUCCESS', 'FAILURE')
            "#,
        )
        .bind(id)
        .bind(state.as_str())
        .bind(&info)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if !applied {
            warn!("Ignoring {} for job {}: already terminal", state, id);
        }
        Ok(applied)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
