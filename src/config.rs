use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::tasks::all_queues;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Broker connection URL (`memory://` or `postgres://...`)
    pub broker_url: String,

    /// Result backend connection URL, defaults to the broker URL
    pub result_backend_url: String,

    /// Directory uploaded documents are written to
    pub upload_dir: PathBuf,

    /// Directory scanned for generated model artifacts
    pub generated_dir: PathBuf,

    /// Maximum accepted upload size (in bytes)
    /// Default: 50MB (50 * 1024 * 1024)
    pub max_file_size: usize,

    /// Origins allowed by CORS; `*` allows any
    pub cors_origins: Vec<String>,

    pub host: String,
    pub port: u16,

    /// Worker loops started alongside the HTTP server
    pub num_workers: u32,

    /// Jobs executed concurrently across all worker loops of this process
    pub max_concurrent_jobs: usize,

    pub max_db_connections: u32,

    /// Broker queues this process's workers consume
    pub worker_queues: Vec<String>,

    /// Idle wait between claims when the queues are empty
    pub poll_interval: Duration,

    /// Report unknown job ids as 404 instead of `pending`
    pub strict_task_lookup: bool,

    /// Simulated work time of the document parser stub
    pub parse_delay: Duration,

    /// Simulated work time of the model generator stub
    pub generate_delay: Duration,

    /// Directory for rotating log files
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_url: "memory://".to_string(),
            result_backend_url: "memory://".to_string(),
            upload_dir: PathBuf::from("uploads"),
            generated_dir: PathBuf::from("generated"),
            max_file_size: 50 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8000".to_string(),
            ],
            host: "127.0.0.1".to_string(),
            port: 8000,
            num_workers: 2,
            max_concurrent_jobs: 4,
            max_db_connections: 5,
            worker_queues: all_queues(),
            poll_interval: Duration::from_millis(1000),
            strict_task_lookup: false,
            parse_delay: Duration::from_millis(2000),
            generate_delay: Duration::from_millis(3000),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Reads a `.env` file first if one exists. Every variable is optional;
    /// see [`Config::from_lookup`] for names and defaults.
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Variables:
    /// - BROKER_URL (default: memory://)
    /// - RESULT_BACKEND_URL (default: BROKER_URL)
    /// - UPLOAD_DIR / GENERATED_DIR (default: uploads / generated)
    /// - MAX_FILE_SIZE in bytes (default: 52428800 = 50MB)
    /// - BACKEND_CORS_ORIGINS comma separated
    /// - HOST / PORT (default: 127.0.0.1 / 8000)
    /// - NUM_WORKERS, MAX_CONCURRENT_JOBS (at least 1), MAX_DB_CONNECTIONS
    /// - WORKER_QUEUES comma separated (default: all queues)
    /// - WORKER_POLL_INTERVAL_MS, PARSE_DELAY_MS, GENERATE_DELAY_MS
    /// - STRICT_TASK_LOOKUP (true/false)
    /// - LOG_DIR (default: logs)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let broker_url = var("BROKER_URL").unwrap_or(defaults.broker_url);
        let result_backend_url = var("RESULT_BACKEND_URL").unwrap_or_else(|| broker_url.clone());

        Ok(Config {
            result_backend_url,
            broker_url,
            upload_dir: var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            generated_dir: var("GENERATED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.generated_dir),
            max_file_size: parse_or(var("MAX_FILE_SIZE"), "MAX_FILE_SIZE", defaults.max_file_size)?,
            cors_origins: var("BACKEND_CORS_ORIGINS")
                .map(|value| split_list(&value))
                .unwrap_or(defaults.cors_origins),
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(var("PORT"), "PORT", defaults.port)?,
            num_workers: parse_or(var("NUM_WORKERS"), "NUM_WORKERS", defaults.num_workers)?,
            max_concurrent_jobs: parse_or(
                var("MAX_CONCURRENT_JOBS"),
                "MAX_CONCURRENT_JOBS",
                NonZeroUsize::new(defaults.max_concurrent_jobs).unwrap_or(NonZeroUsize::MIN),
            )?
            .get(),
            max_db_connections: parse_or(
                var("MAX_DB_CONNECTIONS"),
                "MAX_DB_CONNECTIONS",
                defaults.max_db_connections,
            )?,
            worker_queues: var("WORKER_QUEUES")
                .map(|value| split_list(&value))
                .filter(|queues| !queues.is_empty())
                .unwrap_or(defaults.worker_queues),
            poll_interval: millis_or(
                var("WORKER_POLL_INTERVAL_MS"),
                "WORKER_POLL_INTERVAL_MS",
                defaults.poll_interval,
            )?,
            strict_task_lookup: parse_or(
                var("STRICT_TASK_LOOKUP"),
                "STRICT_TASK_LOOKUP",
                defaults.strict_task_lookup,
            )?,
            parse_delay: millis_or(var("PARSE_DELAY_MS"), "PARSE_DELAY_MS", defaults.parse_delay)?,
            generate_delay: millis_or(
                var("GENERATE_DELAY_MS"),
                "GENERATE_DELAY_MS",
                defaults.generate_delay,
            )?,
            log_dir: var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, String> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: '{}'", key, raw)),
        None => Ok(default),
    }
}

fn millis_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration, String> {
    let default_ms = default.as_millis() as u64;
    parse_or(value, key, default_ms).map(Duration::from_millis)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
