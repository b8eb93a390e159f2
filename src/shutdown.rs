use actix_web::dev::ServerHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::queue::JobStore;
use crate::worker::WorkerPool;

/// HTTP server half of a running process
pub struct RunningServer {
    pub handle: ServerHandle,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

/// Handles graceful shutdown of the application
///
/// This module orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server (stops accepting new requests)
/// 3. Signaling workers to stop claiming new jobs
/// 4. Waiting for in-flight jobs to reach a terminal state
/// 5. Closing job store connections
pub struct ShutdownCoordinator {
    server: Option<RunningServer>,
    workers: Option<WorkerPool>,
    shutdown_tx: watch::Sender<bool>,
    store: JobStore,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    ///
    /// Either half may be absent: `worker` processes run no server and a
    /// gateway started with zero workers has no pool.
    pub fn new(
        server: Option<RunningServer>,
        workers: Option<WorkerPool>,
        shutdown_tx: watch::Sender<bool>,
        store: JobStore,
    ) -> Self {
        Self {
            server,
            workers,
            shutdown_tx,
            store,
        }
    }

    /// Wait for shutdown signal and perform graceful shutdown
    ///
    /// Blocks until CTRL+C or SIGTERM (Unix only) is received.
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        #[cfg(unix)]
        let terminate = sigterm.recv();

        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            result = ctrl_c => {
                result?;
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }

        self.shutdown().await
    }

    /// Perform the actual shutdown sequence
    pub async fn shutdown(self) -> Result<(), std::io::Error> {
        // 1. Stop HTTP server (stop accepting new requests)
        if let Some(server) = &self.server {
            info!("Stopping HTTP server (no longer accepting new requests)...");
            server.handle.stop(true).await;
        }

        // 2. Signal workers to stop (they will finish current jobs)
        info!("Signaling workers to stop claiming new jobs...");
        if let Err(e) = self.shutdown_tx.send(true) {
            // No receivers left means no worker loop is running
            info!("No workers to signal: {:?}", e);
        }

        // 3. Wait for loops and in-flight jobs
        if let Some(workers) = self.workers {
            workers.drain().await;
            info!("All workers stopped");
        }

        // 4. Wait for HTTP server task to complete
        if let Some(server) = self.server {
            match server.task.await {
                Ok(Ok(_)) => info!("HTTP server shut down successfully"),
                Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
                Err(e) => error!("HTTP server task panicked: {:?}", e),
            }
        }

        // 5. Close store connections
        info!("Closing job store connections...");
        self.store.close().await;

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
