use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::api::task::TaskService;

/// Readiness/liveness response
#[derive(Serialize)]
struct ProbeResponse {
    status: String,
    store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[get("/")]
async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "3D Generator API is running" }))
}

/// Health check endpoint
///
/// Fixed payload for load balancers and uptime monitors.
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "healthy" }))
}

/// Readiness check endpoint
///
/// Checks that the result backend answers. Returns 503 while it does not;
/// the process recovers on its own once the store is back.
#[get("/ready")]
async fn readiness_check(service: web::Data<TaskService>) -> impl Responder {
    match service.ping().await {
        Ok(()) => HttpResponse::Ok().json(ProbeResponse {
            status: "ready".to_string(),
            store: "connected".to_string(),
            error: None,
        }),
        Err(e) => {
            error!("Readiness check failed: job store unavailable: {}", e);
            HttpResponse::ServiceUnavailable().json(ProbeResponse {
                status: "not_ready".to_string(),
                store: "disconnected".to_string(),
                error: Some("Job store unavailable".to_string()),
            })
        }
    }
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(ProbeResponse {
        status: "alive".to_string(),
        store: "not_checked".to_string(),
        error: None,
    })
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(root)
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
