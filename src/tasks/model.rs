use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use super::{decode_args, DocumentMetadata, Task, TaskContext, TaskError, GENERATE_3D_MODEL};
use crate::queue::JobState;

/// Description of a generated model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub file_path: String,
    pub format: String,
    pub status: String,
}

/// Produces a 3D model from document metadata
#[async_trait]
pub trait ModelGenerator: Send + Sync {
    async fn generate(&self, metadata: &DocumentMetadata) -> Result<ModelInfo, TaskError>;
}

/// Generator placeholder: waits and describes a GLB that is never written
pub struct StubModelGenerator {
    delay: Duration,
    output_dir: PathBuf,
}

impl StubModelGenerator {
    pub fn new(delay: Duration, output_dir: &Path) -> Self {
        Self {
            delay,
            output_dir: output_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl ModelGenerator for StubModelGenerator {
    async fn generate(&self, _metadata: &DocumentMetadata) -> Result<ModelInfo, TaskError> {
        sleep(self.delay).await;

        let model_id = format!("generated_model_{}", rand::thread_rng().gen_range(100..1000));
        let file_path = self.output_dir.join(format!("{}.glb", model_id));

        Ok(ModelInfo {
            model_id,
            file_path: file_path.display().to_string(),
            format: "GLB".to_string(),
            status: "completed".to_string(),
        })
    }
}

/// `generate_3d_model(metadata)`
pub struct GenerateModel {
    generator: Arc<dyn ModelGenerator>,
}

impl GenerateModel {
    pub fn new(generator: Arc<dyn ModelGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Task for GenerateModel {
    fn name(&self) -> &'static str {
        GENERATE_3D_MODEL
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
        let (metadata,): (DocumentMetadata,) = decode_args(GENERATE_3D_MODEL, args)?;

        ctx.update_state(JobState::Processing, json!({"status": "Generating 3D model"}))
            .await?;

        let model = self.generator.generate(&metadata).await?;
        info!(
            "Job {}: model {} generated for '{}'",
            ctx.job_id(),
            model.model_id,
            metadata.title
        );

        serde_json::to_value(model).map_err(|e| TaskError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryStore, ResultBackend};
    use uuid::Uuid;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            title: "Sample Document".to_string(),
            description: "Extracted from uploaded file".to_string(),
            dimensions: vec![],
            materials: vec![],
            file_type: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn generates_glb_description_under_output_dir() {
        let generator = StubModelGenerator::new(Duration::ZERO, Path::new("generated"));
        let task = GenerateModel::new(Arc::new(generator));
        let store = Arc::new(MemoryStore::new());
        let ctx = TaskContext::new(Uuid::new_v4(), store.clone());

        let result = task.execute(&ctx, json!([metadata()])).await.unwrap();
        let model: ModelInfo = serde_json::from_value(result).unwrap();

        assert!(model.model_id.starts_with("generated_model_"));
        assert_eq!(
            PathBuf::from(&model.file_path),
            Path::new("generated").join(format!("{}.glb", model.model_id))
        );
        assert_eq!(model.format, "GLB");
        assert_eq!(model.status, "completed");

        let record = store.get(ctx.job_id()).await.unwrap().unwrap();
        assert_eq!(record.info, Some(json!({"status": "Generating 3D model"})));
    }

    #[tokio::test]
    async fn rejects_metadata_without_title() {
        let generator = StubModelGenerator::new(Duration::ZERO, Path::new("generated"));
        let task = GenerateModel::new(Arc::new(generator));
        let ctx = TaskContext::new(Uuid::new_v4(), Arc::new(MemoryStore::new()));

        let err = task
            .execute(&ctx, json!([{"file_type": "application/pdf"}]))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidArguments { .. }));
    }
}
