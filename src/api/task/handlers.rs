use actix_multipart::form::{bytes::Bytes, MultipartForm};
use actix_web::{
    HttpResponse, get, post,
    web::{Data, Path, ServiceConfig, scope},
};
use actix_web_validator::Json;

use super::models::UploadedFile;
use super::service::{ServiceError, TaskService};
use crate::tasks::DocumentMetadata;

/// Versioned prefix of the business endpoints
pub const API_PREFIX: &str = "/api/v1";

#[derive(MultipartForm)]
pub struct UploadForm {
    file: Bytes,
}

/// Upload a document for processing
#[post("/upload")]
async fn upload_file(
    service: Data<TaskService>,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> Result<HttpResponse, ServiceError> {
    let file = &form.file;
    let upload = UploadedFile {
        bytes: &file.data,
        content_type: file.content_type.as_ref().map(|mime| mime.essence_str()),
        filename: file.file_name.as_deref(),
    };

    let response = service.submit(upload).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Queue 3D generation from already extracted metadata
#[post("/generate")]
async fn generate_model(
    service: Data<TaskService>,
    metadata: Json<DocumentMetadata>,
) -> Result<HttpResponse, ServiceError> {
    let response = service.submit_generation(metadata.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Poll the status of a task
#[get("/task/{task_id}")]
async fn get_task_status(
    service: Data<TaskService>,
    task_id: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let result = service.get_status(&task_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// List generated 3D models
#[get("/models")]
async fn list_generated_models(service: Data<TaskService>) -> Result<HttpResponse, ServiceError> {
    let response = service.list_models().await?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn task_config(config: &mut ServiceConfig) {
    config.service(
        scope(API_PREFIX)
            .service(upload_file)
            .service(generate_model)
            .service(get_task_status)
            .service(list_generated_models),
    );
}
