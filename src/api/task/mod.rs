pub mod dto;
pub mod handlers;
pub mod models;
pub mod service;

// Re-export commonly used types
pub use handlers::{task_config, API_PREFIX};
pub use models::{TaskStatus, UploadedFile};
pub use service::{ServiceError, TaskService};
