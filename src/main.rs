use actix_web::{App, HttpServer, middleware::Logger, web};
use clap::{Parser, Subcommand};
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use modelgen_api::api::{self, TaskService};
use modelgen_api::config::Config;
use modelgen_api::db::migrations::migrate_stores;
use modelgen_api::logging;
use modelgen_api::queue::{is_postgres_url, JobStore};
use modelgen_api::shutdown::{RunningServer, ShutdownCoordinator};
use modelgen_api::tasks::TaskRegistry;
use modelgen_api::worker::{JobWorker, WorkerPool};

#[derive(Parser)]
#[command(name = "modelgen-api", version, about = "3D generator document API and workers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API, with embedded workers unless --workers 0
    Serve {
        /// Worker loops to run in this process (overrides NUM_WORKERS)
        #[arg(long)]
        workers: Option<u32>,
    },
    /// Run only the worker pool
    Worker {
        /// Comma separated queues to consume (overrides WORKER_QUEUES)
        #[arg(long, value_delimiter = ',')]
        queues: Option<Vec<String>>,
        /// Jobs executed at once (overrides MAX_CONCURRENT_JOBS)
        #[arg(long)]
        concurrency: Option<NonZeroUsize>,
        /// Worker loops (overrides NUM_WORKERS)
        #[arg(long)]
        workers: Option<u32>,
    },
    /// Apply database migrations to the broker and result backend, then exit
    Migrate,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.log_dir) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let result = match cli.command.unwrap_or(Command::Serve { workers: None }) {
        Command::Serve { workers } => {
            if let Some(workers) = workers {
                config.num_workers = workers;
            }
            serve(config).await
        }
        Command::Worker {
            queues,
            concurrency,
            workers,
        } => {
            if let Some(queues) = queues.filter(|queues| !queues.is_empty()) {
                config.worker_queues = queues;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrent_jobs = concurrency.get();
            }
            config.num_workers = workers.unwrap_or(config.num_workers).max(1);
            work(config).await
        }
        Command::Migrate => migrate(&config).await,
    };

    if let Err(e) = &result {
        error!("Exiting with error: {}", e);
    }
    result
}

async fn connect_store(config: &Config) -> io::Result<JobStore> {
    JobStore::connect(
        &config.broker_url,
        &config.result_backend_url,
        config.max_db_connections,
    )
    .await
    .map_err(|e| io::Error::other(format!("Failed to connect to job store: {}", e)))
}

fn spawn_workers(config: &Config, store: JobStore, shutdown_rx: watch::Receiver<bool>) -> WorkerPool {
    let registry = Arc::new(TaskRegistry::standard(config));
    info!("Registered tasks: {:?}", registry.names());

    let worker = JobWorker::new(
        store,
        registry,
        config.worker_queues.clone(),
        config.poll_interval,
    );
    WorkerPool::spawn(
        worker,
        config.num_workers,
        config.max_concurrent_jobs,
        shutdown_rx,
    )
}

async fn serve(config: Config) -> io::Result<()> {
    info!("Starting modelgen-api gateway");
    info!("Configuration loaded successfully:");
    info!("  - Upload directory: {}", config.upload_dir.display());
    info!("  - Generated directory: {}", config.generated_dir.display());
    info!("  - Max file size: {} bytes", config.max_file_size);
    info!("  - Embedded workers: {}", config.num_workers);
    info!("  - Max concurrent jobs: {}", config.max_concurrent_jobs);
    info!("  - Strict task lookup: {}", config.strict_task_lookup);

    let store = connect_store(&config).await?;

    if config.num_workers == 0 && !is_postgres_url(&config.broker_url) {
        warn!("In-memory broker with no embedded workers: queued jobs will never run");
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers =
        (config.num_workers > 0).then(|| spawn_workers(&config, store.clone(), shutdown_rx));

    let service = web::Data::new(TaskService::new(store.clone(), &config));
    let max_file_size = config.max_file_size;
    let origins = config.cors_origins.clone();

    info!("Server starting on http://{}:{}", config.host, config.port);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(api::cors(&origins))
            .wrap(Logger::default())
            .configure(api::configure(service.clone(), max_file_size))
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    let running = RunningServer {
        handle: server.handle(),
        task: actix_web::rt::spawn(server),
    };

    ShutdownCoordinator::new(Some(running), workers, shutdown_tx, store)
        .wait_for_shutdown()
        .await
}

async fn work(config: Config) -> io::Result<()> {
    info!(
        "Starting {} worker loops on queues {:?} (max {} concurrent jobs)",
        config.num_workers, config.worker_queues, config.max_concurrent_jobs
    );

    if !is_postgres_url(&config.broker_url) {
        warn!("In-memory broker: this process only sees jobs it enqueues itself");
    }

    let store = connect_store(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(&config, store.clone(), shutdown_rx);

    ShutdownCoordinator::new(None, Some(workers), shutdown_tx, store)
        .wait_for_shutdown()
        .await
}

async fn migrate(config: &Config) -> io::Result<()> {
    let migrated = migrate_stores(
        &config.broker_url,
        &config.result_backend_url,
        config.max_db_connections,
    )
    .await
    .map_err(|e| io::Error::other(format!("Migration failed: {}", e)))?;

    if migrated == 0 {
        warn!("No Postgres store configured, nothing to migrate");
    } else {
        info!("Migrated {} database(s)", migrated);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_concurrency_must_be_positive() {
        assert!(Cli::try_parse_from(["modelgen-api", "worker", "--concurrency", "0"]).is_err());

        let cli = Cli::try_parse_from(["modelgen-api", "worker", "--concurrency", "3"]).unwrap();
        match cli.command {
            Some(Command::Worker { concurrency, .. }) => {
                assert_eq!(concurrency.map(NonZeroUsize::get), Some(3));
            }
            _ => panic!("expected the worker subcommand"),
        }
    }
}
