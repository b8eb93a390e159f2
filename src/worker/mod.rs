pub mod job_worker;

pub use job_worker::{execute_job, JobOutcome, JobWorker, WorkerPool};
