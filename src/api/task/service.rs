use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::dto::{ModelsResponse, TaskResponse, TaskResult};
use super::models::{is_supported_content_type, TaskStatus, UploadedFile};
use crate::api::validation::ErrorResponse;
use crate::config::Config;
use crate::queue::{JobStore, StoreError, TaskMessage};
use crate::storage::{list_artifacts, UploadStore};
use crate::tasks::{DocumentMetadata, GENERATE_3D_MODEL, PROCESS_DOCUMENT};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Upload content type outside the allowlist
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Upload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Unknown job id under strict lookup
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Job store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("File system error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::UnsupportedMediaType(_) | ServiceError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::StoreError(_) | ServiceError::IoError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message) = match self {
            ServiceError::UnsupportedMediaType(content_type) => {
                warn!("Rejected upload with content type {}", content_type);
                ("Unsupported media type", "Only PDF and Email files are supported".to_string())
            }
            ServiceError::PayloadTooLarge { .. } => {
                warn!("{}", self);
                ("Payload too large", self.to_string())
            }
            ServiceError::NotFound(id) => {
                warn!("Task not found: {}", id);
                ("Not found", format!("Task with id {} not found", id))
            }
            ServiceError::ValidationError(msg) => {
                warn!("Validation error: {}", msg);
                ("Validation failed", msg.clone())
            }
            ServiceError::StoreError(e) => {
                error!("Job store error: {}", e);
                ("Failed to process request", "Job store error occurred".to_string())
            }
            ServiceError::IoError(e) => {
                error!("File system error: {}", e);
                ("Failed to process request", "File storage error occurred".to_string())
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error.to_string(),
            fields: json!({ "message": message }),
        })
    }
}

/// Gateway logic behind the HTTP handlers
pub struct TaskService {
    store: JobStore,
    uploads: UploadStore,
    generated_dir: PathBuf,
    max_file_size: usize,
    strict_lookup: bool,
}

impl TaskService {
    /// Create a new TaskService instance
    pub fn new(store: JobStore, config: &Config) -> Self {
        Self {
            store,
            uploads: UploadStore::new(config.upload_dir.clone()),
            generated_dir: config.generated_dir.clone(),
            max_file_size: config.max_file_size,
            strict_lookup: config.strict_task_lookup,
        }
    }

    /// Accept an uploaded document and queue it for processing
    ///
    /// # Business Logic
    /// - Validates the content type against the allowlist
    /// - Enforces the configured maximum file size
    /// - Stores the file as `{id}.{ext}` under the upload directory
    /// - Enqueues `process_document(path, content_type)` keyed by the same id
    ///
    /// Nothing is written or enqueued when validation fails.
    pub async fn submit(&self, file: UploadedFile<'_>) -> Result<TaskResponse, ServiceError> {
        let content_type = file.content_type.unwrap_or_default();
        if !is_supported_content_type(content_type) {
            return Err(ServiceError::UnsupportedMediaType(content_type.to_string()));
        }

        if file.bytes.len() > self.max_file_size {
            return Err(ServiceError::PayloadTooLarge {
                size: file.bytes.len(),
                limit: self.max_file_size,
            });
        }

        let task_id = Uuid::new_v4();
        info!(
            "Service: Accepting upload {:?} ({}, {} bytes) as task {}",
            file.filename,
            content_type,
            file.bytes.len(),
            task_id
        );

        let path = self.uploads.save(task_id, file.filename, file.bytes).await?;

        let message = TaskMessage::new(
            task_id,
            PROCESS_DOCUMENT,
            json!([path.to_string_lossy(), content_type]),
        );
        self.store.broker.enqueue(&message).await?;

        info!("Service: Task {} queued on {}", task_id, message.queue);

        Ok(TaskResponse::processing(
            task_id,
            "File uploaded successfully. Processing started.",
        ))
    }

    /// Queue 3D model generation from document metadata
    pub async fn submit_generation(
        &self,
        metadata: DocumentMetadata,
    ) -> Result<TaskResponse, ServiceError> {
        metadata
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let task_id = Uuid::new_v4();
        let message = TaskMessage::new(task_id, GENERATE_3D_MODEL, json!([metadata]));
        self.store.broker.enqueue(&message).await?;

        info!("Service: Generation task {} queued on {}", task_id, message.queue);

        Ok(TaskResponse::processing(task_id, "Model generation queued."))
    }

    /// Look up the current state of a job
    ///
    /// An id the result backend has no record of is reported as `pending`.
    /// With strict lookup, ids the broker has never seen are `NotFound`.
    pub async fn get_status(&self, task_id: &str) -> Result<TaskResult, ServiceError> {
        let id = Uuid::parse_str(task_id).ok();

        let record = match id {
            Some(id) => self.store.backend.get(id).await?,
            None => None,
        };

        if record.is_none() && self.strict_lookup {
            let known = match id {
                Some(id) => self.store.broker.contains(id).await?,
                None => false,
            };
            if !known {
                return Err(ServiceError::NotFound(task_id.to_string()));
            }
        }

        Ok(TaskResult::new(task_id, TaskStatus::from_record(record)))
    }

    /// List generated model files
    pub async fn list_models(&self) -> Result<ModelsResponse, ServiceError> {
        let models = list_artifacts(&self.generated_dir).await?;
        Ok(ModelsResponse { models })
    }

    /// Connectivity check for the readiness probe
    pub async fn ping(&self) -> Result<(), ServiceError> {
        Ok(self.store.backend.ping().await?)
    }
}
