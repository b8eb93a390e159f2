pub mod health;
pub mod task;
pub mod validation;

use actix_cors::Cors;
use actix_web::http::Uri;
use actix_web::web::{Data, ServiceConfig};
use tracing::warn;

use crate::api::{health::health_config, task::task_config};
pub use task::TaskService;

/// Register shared state and every route on an App
///
/// `service` is created once and cloned into each HTTP worker thread.
pub fn configure(
    service: Data<TaskService>,
    max_file_size: usize,
) -> impl FnOnce(&mut ServiceConfig) {
    move |config| {
        config
            .app_data(service)
            .app_data(validation::multipart_config(max_file_size))
            .app_data(validation::json_config())
            .configure(health_config)
            .configure(task_config);
    }
}

/// CORS policy for the configured origins; `*` allows any origin
pub fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600);

    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }

    origins
        .iter()
        .filter(|origin| match origin.parse::<Uri>() {
            Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => true,
            _ => {
                warn!("Ignoring malformed CORS origin {:?}", origin);
                false
            }
        })
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}
