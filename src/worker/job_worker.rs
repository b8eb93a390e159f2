use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::queue::{JobState, JobStore, StoreError, TaskMessage};
use crate::tasks::{TaskContext, TaskError, TaskRegistry};

/// How a claimed job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    /// The job was already terminal when claimed and was not run again
    Skipped,
}

/// Run one claimed job through the state protocol
///
/// # State protocol
/// - Record PROCESSING (no info) as soon as the job is claimed
/// - Execute the task; it may publish progress through its context
/// - `Ok(value)` is recorded as SUCCESS with `value` as the result
/// - `Err(e)` is recorded as FAILURE with the error text
///
/// Terminal states are written only here, once per job.
pub async fn execute_job(store: &JobStore, registry: &TaskRegistry, message: TaskMessage) -> JobOutcome {
    let job_id = message.id;

    match store.backend.store(job_id, JobState::Processing, None).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Job {} is already finished, skipping", job_id);
            return JobOutcome::Skipped;
        }
        Err(e) => error!("Failed to mark job {} as processing: {}", job_id, e),
    }

    let result = match registry.get(&message.task) {
        Some(task) => {
            let ctx = TaskContext::new(job_id, Arc::clone(&store.backend));
            let args = message.args;

            // Run on its own task so a panic becomes a failed job
            let handle = tokio::spawn(async move { task.execute(&ctx, args).await });
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(TaskError::Panicked(join_err.to_string())),
            }
        }
        None => Err(TaskError::UnknownTask(message.task.clone())),
    };

    match result {
        Ok(value) => {
            if let Err(e) = store.backend.store(job_id, JobState::Success, Some(value)).await {
                error!("Failed to record success of job {}: {}", job_id, e);
            }
            JobOutcome::Completed
        }
        Err(task_err) => {
            let message = task_err.to_string();
            warn!("Job {} failed: {}", job_id, message);
            let info = serde_json::Value::String(message.clone());
            if let Err(e) = store.backend.store(job_id, JobState::Failure, Some(info)).await {
                error!("Failed to record failure of job {}: {}", job_id, e);
            }
            JobOutcome::Failed(message)
        }
    }
}

/// Background worker claiming jobs from a set of broker queues
pub struct JobWorker {
    store: JobStore,
    registry: Arc<TaskRegistry>,
    queues: Vec<String>,
    poll_interval: Duration,
}

impl JobWorker {
    /// Create a new JobWorker instance
    pub fn new(
        store: JobStore,
        registry: Arc<TaskRegistry>,
        queues: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            queues,
            poll_interval,
        }
    }

    /// Claim and execute a single job inline
    ///
    /// Returns `None` when every queue is empty.
    pub async fn run_once(&self) -> Result<Option<(Uuid, JobOutcome)>, StoreError> {
        match self.store.broker.claim(&self.queues).await? {
            Some(message) => {
                let job_id = message.id;
                let outcome = execute_job(&self.store, &self.registry, message).await;
                Ok(Some((job_id, outcome)))
            }
            None => Ok(None),
        }
    }

    /// Run worker with semaphore-based bounded concurrency
    ///
    /// # Concurrency Model
    /// - A semaphore permit is acquired before claiming, so a claimed job
    ///   never waits for capacity
    /// - Each claimed job runs on its own spawned task holding the permit
    /// - Sleeps for the poll interval when no jobs are available
    /// - Stops claiming as soon as shutdown is signalled; jobs already
    ///   running keep their permits until they finish
    pub async fn run(
        &self,
        worker_id: u32,
        semaphore: Arc<Semaphore>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Worker {} started on queues {:?}", worker_id, self.queues);

        loop {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("Worker {} failed to acquire semaphore: {:?}", worker_id, e);
                        break;
                    }
                },
                _ = shutdown_rx.changed() => break,
            };

            if *shutdown_rx.borrow() {
                break;
            }

            match self.store.broker.claim(&self.queues).await {
                Ok(Some(message)) => {
                    info!(
                        "Worker {} acquired job: id={}, task={}",
                        worker_id, message.id, message.task
                    );

                    let store = self.store.clone();
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        let job_id = message.id;
                        let outcome = execute_job(&store, &registry, message).await;
                        info!("Finished job {}: {:?}", job_id, outcome);

                        drop(permit);
                        debug!("Released semaphore permit for job {}", job_id);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    debug!("Worker {} found no jobs available, sleeping...", worker_id);
                    if wait_or_shutdown(&mut shutdown_rx, self.poll_interval).await {
                        break;
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!("Worker {} encountered store error: {}", worker_id, e);
                    if wait_or_shutdown(&mut shutdown_rx, Duration::from_secs(1)).await {
                        break;
                    }
                }
            }
        }

        info!("Worker {} stopped", worker_id);
    }
}

/// Sleep for `delay`; returns true if shutdown was signalled meanwhile
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = sleep(delay) => false,
        _ = shutdown_rx.changed() => true,
    }
}

/// Worker loops of one process sharing a concurrency limit
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Spawn `num_workers` loops over one shared worker definition
    pub fn spawn(
        worker: JobWorker,
        num_workers: u32,
        max_concurrent_jobs: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let worker = Arc::new(worker);
        let semaphore = Arc::new(Semaphore::new(max_concurrent_jobs));
        let mut handles = Vec::new();

        for worker_id in 1..=num_workers {
            let worker = Arc::clone(&worker);
            let worker_semaphore = semaphore.clone();
            let worker_shutdown_rx = shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                worker.run(worker_id, worker_semaphore, worker_shutdown_rx).await;
            });

            handles.push(handle);
            info!("Spawned worker {}", worker_id);
        }

        Self {
            handles,
            semaphore,
            capacity: max_concurrent_jobs,
        }
    }

    /// Wait for every loop to stop and every in-flight job to finish
    ///
    /// Call after signalling shutdown.
    pub async fn drain(self) {
        let num_workers = self.handles.len();
        info!("Waiting for {} workers to stop...", num_workers);

        for (i, handle) in self.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Worker {} failed to stop: {:?}", i + 1, e);
            }
        }

        // Every permit back means no job is still running
        match self.semaphore.acquire_many(self.capacity as u32).await {
            Ok(_) => info!("All in-flight jobs completed"),
            Err(e) => error!("Failed to wait for in-flight jobs: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ResultBackend;
    use crate::tasks::Task;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Task for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn execute(
            &self,
            ctx: &TaskContext,
            args: serde_json::Value,
        ) -> Result<serde_json::Value, TaskError> {
            ctx.update_state(JobState::Custom("ECHOING".into()), json!({"step": 1}))
                .await?;
            Ok(args)
        }
    }

    struct Boom;

    #[async_trait]
    impl Task for Boom {
        fn name(&self) -> &'static str {
            "boom"
        }

        async fn execute(
            &self,
            _ctx: &TaskContext,
            _args: serde_json::Value,
        ) -> Result<serde_json::Value, TaskError> {
            Err(TaskError::Failed("disk on fire".to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl Task for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        async fn execute(
            &self,
            _ctx: &TaskContext,
            _args: serde_json::Value,
        ) -> Result<serde_json::Value, TaskError> {
            panic!("unexpected input")
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new()
            .register(Arc::new(Echo))
            .register(Arc::new(Boom))
            .register(Arc::new(Panics))
    }

    #[tokio::test]
    async fn success_records_the_returned_value() {
        let store = JobStore::in_memory();
        let message = TaskMessage::new(Uuid::new_v4(), "echo", json!(["a", 1]));
        let id = message.id;

        let outcome = execute_job(&store, &registry(), message).await;

        assert_eq!(outcome, JobOutcome::Completed);
        let record = store.backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Success);
        assert_eq!(record.info, Some(json!(["a", 1])));
    }

    #[tokio::test]
    async fn errors_record_failure_with_message() {
        let store = JobStore::in_memory();
        let message = TaskMessage::new(Uuid::new_v4(), "boom", json!([]));
        let id = message.id;

        let outcome = execute_job(&store, &registry(), message).await;

        assert_eq!(outcome, JobOutcome::Failed("disk on fire".to_string()));
        let record = store.backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failure);
        assert_eq!(record.info, Some(json!("disk on fire")));
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let store = JobStore::in_memory();
        let message = TaskMessage::new(Uuid::new_v4(), "panics", json!([]));
        let id = message.id;

        let outcome = execute_job(&store, &registry(), message).await;

        assert!(matches!(outcome, JobOutcome::Failed(msg) if msg.starts_with("Task panicked")));
        let record = store.backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failure);
    }

    #[tokio::test]
    async fn unknown_tasks_fail() {
        let store = JobStore::in_memory();
        let message = TaskMessage::new(Uuid::new_v4(), "nope", json!([]));
        let id = message.id;

        let outcome = execute_job(&store, &registry(), message).await;

        assert_eq!(outcome, JobOutcome::Failed("Unknown task: nope".to_string()));
        let record = store.backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failure);
    }

    #[tokio::test]
    async fn finished_jobs_are_not_rerun() {
        let store = JobStore::in_memory();
        let message = TaskMessage::new(Uuid::new_v4(), "echo", json!(["first"]));
        let id = message.id;

        execute_job(&store, &registry(), message.clone()).await;
        let outcome = execute_job(&store, &registry(), message).await;

        assert_eq!(outcome, JobOutcome::Skipped);
        let record = store.backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.info, Some(json!(["first"])));
    }

    #[tokio::test]
    async fn run_once_claims_from_configured_queues() {
        let store = JobStore::in_memory();
        let message = TaskMessage::new(Uuid::new_v4(), "echo", json!([]));
        store.broker.enqueue(&message).await.unwrap();

        let documents_only = JobWorker::new(
            store.clone(),
            Arc::new(registry()),
            vec!["document_processing".to_string()],
            Duration::from_millis(10),
        );
        assert!(documents_only.run_once().await.unwrap().is_none());

        let default_queue = JobWorker::new(
            store.clone(),
            Arc::new(registry()),
            vec!["default".to_string()],
            Duration::from_millis(10),
        );
        let (id, outcome) = default_queue.run_once().await.unwrap().unwrap();
        assert_eq!(id, message.id);
        assert_eq!(outcome, JobOutcome::Completed);
        assert!(default_queue.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pool_processes_jobs_and_drains_on_shutdown() {
        let store = JobStore::in_memory();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store
                .broker
                .enqueue(&TaskMessage::new(*id, "echo", json!([id.to_string()])))
                .await
                .unwrap();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = JobWorker::new(
            store.clone(),
            Arc::new(registry()),
            crate::tasks::all_queues(),
            Duration::from_millis(5),
        );
        let pool = WorkerPool::spawn(worker, 2, 2, shutdown_rx);

        let mut finished = 0;
        for _ in 0..200 {
            finished = 0;
            for id in &ids {
                if let Some(record) = store.backend.get(*id).await.unwrap() {
                    if record.state.is_terminal() {
                        finished += 1;
                    }
                }
            }
            if finished == ids.len() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(finished, ids.len());

        shutdown_tx.send(true).unwrap();
        pool.drain().await;
    }
}
