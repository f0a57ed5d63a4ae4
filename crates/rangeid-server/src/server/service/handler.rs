//! The ID service behind the HTTP routes.
//!
//! [`IdService`] brings up one instance per worker (connect, ensure the pool,
//! claim a range), spawns the worker tasks and forwards every ID request to
//! one of them. Handlers never touch a dispenser directly. Pool reads do not
//! go through the workers and leave the round-robin order alone.

use crate::server::{
    config::ServerConfig,
    error::ServiceError,
    pool::{manager::WorkerPool, request::WorkRequest, worker::worker_loop},
    service::config::{Backend, Dispenser},
};
#[cfg_attr(not(feature = "tracing"), allow(unused_imports))]
use rangeid::IdDispenser;
use rangeid::{IdRange, PoolConfig, RangePool};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Requests a worker may have queued before senders wait.
const WORK_QUEUE_CAPACITY: usize = 128;

#[derive(Clone)]
pub struct IdService {
    worker_pool: Arc<WorkerPool>,
    backend: Backend,
    pool: PoolConfig,
}

impl IdService {
    /// Connects to the configured coordinator and starts the workers.
    ///
    /// Blocks while connection attempts are retried; call it from a context
    /// that may block.
    pub fn connect(config: &ServerConfig) -> rangeid::Result<Self> {
        let backend = Backend::with_endpoint(config.coordinator_endpoint.as_str());
        Self::with_backend(&backend, config)
    }

    /// Starts `config.num_workers` workers against `backend`.
    ///
    /// Every worker is bootstrapped before any task is spawned. If one fails,
    /// the sessions opened so far are closed and the error is returned.
    pub fn with_backend(backend: &Backend, config: &ServerConfig) -> rangeid::Result<Self> {
        let dispensers = (0..config.num_workers)
            .map(|_worker_id| -> rangeid::Result<Dispenser> {
                let dispenser = Dispenser::connect(backend, config.retry, config.pool.clone())?;

                #[cfg(feature = "tracing")]
                tracing::info!(
                    worker_id = _worker_id,
                    range = ?dispenser.current_range()?,
                    "worker registered"
                );

                Ok(dispenser)
            })
            .collect::<rangeid::Result<Vec<_>>>()?;

        let mut workers = Vec::with_capacity(dispensers.len());
        for (worker_id, dispenser) in dispensers.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel(WORK_QUEUE_CAPACITY);
            workers.push(tx);
            tokio::spawn(worker_loop(worker_id, rx, dispenser));
        }

        let worker_pool =
            WorkerPool::new(workers, CancellationToken::new(), config.shutdown_timeout);
        Ok(Self {
            worker_pool: Arc::new(worker_pool),
            backend: backend.clone(),
            pool: config.pool.clone().with_retry(config.retry),
        })
    }

    /// Issues the next ID from one of the workers.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn next_id(&self) -> Result<u64, ServiceError> {
        self.dispatch(|response| WorkRequest::NextId { response }).await
    }

    /// Ranges still unclaimed in the shared pool.
    ///
    /// Read through a short-lived session of its own on the blocking pool,
    /// so no worker is involved and no ID request changes hands.
    pub async fn remaining(&self) -> Result<Vec<IdRange>, ServiceError> {
        let _inflight = self.worker_pool.begin_request()?;
        let backend = self.backend.clone();
        let pool = self.pool.clone();

        let result = tokio::task::spawn_blocking(move || {
            let session = pool.retry().connect(&backend)?;
            RangePool::new(session, pool).remaining()
        })
        .await
        .map_err(|e| ServiceError::ChannelError {
            context: format!("pool reader failed: {e}"),
        })?;
        Ok(result?)
    }

    pub fn is_serving(&self) -> bool {
        !self.worker_pool.is_shutting_down()
    }

    /// Initiates a graceful shutdown of the worker pool.
    ///
    /// New requests are refused, in-flight ones get a chance to finish, then
    /// every worker closes its session.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.worker_pool.shutdown().await
    }

    async fn dispatch<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<rangeid::Result<T>>) -> WorkRequest,
    ) -> Result<T, ServiceError> {
        let _inflight = self.worker_pool.begin_request()?;
        let (tx, rx) = oneshot::channel();
        self.worker_pool.send_to_next_worker(request(tx)).await?;
        let result = rx.await.map_err(|_| ServiceError::ChannelError {
            context: "worker dropped the reply".to_owned(),
        })?;
        Ok(result?)
    }
}
