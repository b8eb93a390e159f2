//! Named task functions executed by workers.
//!
//! A task receives its positional arguments as a JSON array and returns a
//! JSON result. Progress is reported through [`TaskContext`]; the worker
//! harness records the terminal state from the returned `Result`.

pub mod document;
pub mod model;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::queue::{JobState, ResultBackend, StoreError};
pub use document::{DocumentMetadata, DocumentParser, ProcessDocument, StubDocumentParser};
pub use model::{GenerateModel, ModelGenerator, ModelInfo, StubModelGenerator};

pub const PROCESS_DOCUMENT: &str = "process_document";
pub const GENERATE_3D_MODEL: &str = "generate_3d_model";

pub const DOCUMENT_QUEUE: &str = "document_processing";
pub const GENERATION_QUEUE: &str = "3d_generation";
pub const DEFAULT_QUEUE: &str = "default";

/// Broker queue a task is routed to
pub fn queue_for(task: &str) -> &'static str {
    match task {
        PROCESS_DOCUMENT => DOCUMENT_QUEUE,
        GENERATE_3D_MODEL => GENERATION_QUEUE,
        _ => DEFAULT_QUEUE,
    }
}

/// Every queue a worker consumes when none are configured
pub fn all_queues() -> Vec<String> {
    vec![
        DOCUMENT_QUEUE.to_string(),
        GENERATION_QUEUE.to_string(),
        DEFAULT_QUEUE.to_string(),
    ]
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid arguments for {task}: {reason}")]
    InvalidArguments { task: String, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Result backend error: {0}")]
    Store(#[from] StoreError),
}

/// Decode a positional JSON argument list into a typed tuple
pub fn decode_args<T: DeserializeOwned>(
    task: &str,
    args: serde_json::Value,
) -> Result<T, TaskError> {
    serde_json::from_value(args).map_err(|e| TaskError::InvalidArguments {
        task: task.to_string(),
        reason: e.to_string(),
    })
}

/// Handle a running task uses to publish intermediate state
pub struct TaskContext {
    job_id: Uuid,
    backend: Arc<dyn ResultBackend>,
}

impl TaskContext {
    pub fn new(job_id: Uuid, backend: Arc<dyn ResultBackend>) -> Self {
        Self { job_id, backend }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Report a non-terminal state visible to pollers.
    ///
    /// Terminal states belong to the harness: a task finishes by returning.
    pub async fn update_state(
        &self,
        state: JobState,
        info: serde_json::Value,
    ) -> Result<(), TaskError> {
        if state.is_terminal() {
            return Err(StoreError::InvalidState {
                id: self.job_id,
                state,
            }
            .into());
        }

        debug!("Job {} reports {}: {}", self.job_id, state, info);
        if !self.backend.store(self.job_id, state, Some(info)).await? {
            warn!("Progress report for job {} was dropped", self.job_id);
        }
        Ok(())
    }
}

/// A named function a worker can execute for a job
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        ctx: &TaskContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError>;
}

/// Task lookup table, built once at startup
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its own name, replacing any previous one
    pub fn register(mut self, task: Arc<dyn Task>) -> Self {
        self.tasks.insert(task.name(), task);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tasks.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// The document parser and model generator stubs
    pub fn standard(config: &Config) -> Self {
        let parser = StubDocumentParser::new(config.parse_delay);
        let generator = StubModelGenerator::new(config.generate_delay, &config.generated_dir);

        Self::new()
            .register(Arc::new(ProcessDocument::new(Arc::new(parser))))
            .register(Arc::new(GenerateModel::new(Arc::new(generator))))
    }
}
