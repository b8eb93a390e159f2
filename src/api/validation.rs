use actix_multipart::{form::MultipartFormConfig, MultipartError};
use actix_web::{
    error::{InternalError, PayloadError},
    HttpResponse, ResponseError,
};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

fn bad_request(error: &str, fields: serde_json::Value) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: error.to_string(),
        fields,
    })
}

/// Creates a configured JsonConfig with standardized error handling for the entire project
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default().error_handler(|err, _req| {
        let response = match &err {
            actix_web_validator::Error::Validate(validation_errors) => {
                let mut fields = serde_json::Map::new();
                for (field, errors) in validation_errors.field_errors() {
                    let messages: Vec<String> = errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| format!("Validation error in field: {}", field))
                        })
                        .collect();
                    fields.insert(field.to_string(), json!({ "errors": messages }));
                }
                bad_request("Validation failed", serde_json::Value::Object(fields))
            }
            actix_web_validator::Error::Deserialize(de_err) => {
                let err_string = de_err.to_string();
                let message = if err_string.contains("EOF while parsing") {
                    "Request body is empty. Expected JSON payload"
                } else if err_string.contains("missing field") {
                    "Required field is missing"
                } else {
                    "Invalid JSON format"
                };
                bad_request("Request validation failed", json!({ "message": message }))
            }
            _ => bad_request("Validation failed", json!({ "message": "Validation error" })),
        };

        warn!("Rejected JSON body: {}", err);
        InternalError::from_response(err, response).into()
    })
}

/// Multipart limits sized to the configured maximum upload, with errors in
/// the standard envelope
pub fn multipart_config(max_file_size: usize) -> MultipartFormConfig {
    let limit = max_file_size.saturating_add(MULTIPART_OVERHEAD);

    MultipartFormConfig::default()
        .total_limit(limit)
        .memory_limit(limit)
        .error_handler(move |err, _req| {
            warn!("Rejected multipart upload: {}", err);
            let response = match &err {
                MultipartError::Payload(PayloadError::Overflow) => {
                    HttpResponse::PayloadTooLarge().json(ErrorResponse {
                        error: "Payload too large".to_string(),
                        fields: json!({
                            "message": format!(
                                "Upload exceeds the limit of {} bytes",
                                max_file_size
                            )
                        }),
                    })
                }
                _ => HttpResponse::build(err.status_code()).json(ErrorResponse {
                    error: "Invalid upload".to_string(),
                    fields: json!({ "message": err.to_string() }),
                }),
            };
            InternalError::from_response(err, response).into()
        })
}
