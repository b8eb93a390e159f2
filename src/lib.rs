//! Document upload API that dispatches parsing and 3D generation jobs to a
//! worker pool through a broker, and reports job state from a result
//! backend.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod queue;
pub mod shutdown;
pub mod storage;
pub mod tasks;
pub mod worker;

pub use config::Config;
pub use queue::{JobState, JobStore};
pub use tasks::TaskRegistry;
