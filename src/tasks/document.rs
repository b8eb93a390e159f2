use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use validator::Validate;

use super::{decode_args, Task, TaskContext, TaskError, PROCESS_DOCUMENT};
use crate::queue::JobState;

/// Metadata extracted from an uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DocumentMetadata {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters"
    ))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[validate(length(min = 1, message = "File type must not be empty"))]
    pub file_type: String,
}

/// Extracts metadata from a stored document
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, path: &Path, content_type: &str) -> Result<DocumentMetadata, TaskError>;
}

/// Parser placeholder: confirms the file is readable, waits, and returns a
/// fixed record
pub struct StubDocumentParser {
    delay: Duration,
}

impl StubDocumentParser {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DocumentParser for StubDocumentParser {
    async fn parse(&self, path: &Path, content_type: &str) -> Result<DocumentMetadata, TaskError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|e| TaskError::Failed(format!("Cannot read {}: {}", path.display(), e)))?;

        sleep(self.delay).await;

        Ok(DocumentMetadata {
            title: "Sample Document".to_string(),
            description: "Extracted from uploaded file".to_string(),
            dimensions: Vec::new(),
            materials: Vec::new(),
            file_type: content_type.to_string(),
        })
    }
}

/// `process_document(path, content_type)`
pub struct ProcessDocument {
    parser: Arc<dyn DocumentParser>,
}

impl ProcessDocument {
    pub fn new(parser: Arc<dyn DocumentParser>) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl Task for ProcessDocument {
    fn name(&self) -> &'static str {
        PROCESS_DOCUMENT
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
        let (path, content_type): (String, String) = decode_args(PROCESS_DOCUMENT, args)?;

        ctx.update_state(JobState::Processing, json!({"status": "Parsing document"}))
            .await?;

        let metadata = self.parser.parse(Path::new(&path), &content_type).await?;
        info!("Job {}: document {} parsed", ctx.job_id(), path);

        serde_json::to_value(metadata).map_err(|e| TaskError::Failed(e.to_string()))
    }
}
