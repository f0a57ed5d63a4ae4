//! Asynchronous worker pool for ID issuance.
//!
//! This module defines the [`WorkerPool`] struct, which manages a set of
//! worker tasks, each owning one dispenser. It distributes work using
//! round-robin scheduling, counts in-flight requests so shutdown can drain
//! them, and supports coordinated shutdown via a shared [`CancellationToken`].
//!
//! Each worker listens on its own bounded [`mpsc::Receiver`] and executes tasks
//! independently, so the dispensers never need a lock.

use crate::server::{error::ServiceError, pool::request::WorkRequest};
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Marks a request as in flight until dropped.
#[must_use]
pub struct InflightGuard {
    inflight: Arc<AtomicUsize>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A cooperative pool of worker tasks that process [`WorkRequest`]s.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    inflight: Arc<AtomicUsize>,
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Constructs a new [`WorkerPool`] from initialized worker channels and a
    /// shared cancellation token.
    pub fn new(
        workers: Vec<mpsc::Sender<WorkRequest>>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            inflight: Arc::new(AtomicUsize::new(0)),
            shutting_down: AtomicBool::new(false),
            shutdown_token,
            shutdown_timeout,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Registers a new request, refusing it once shutdown has begun.
    pub fn begin_request(&self) -> Result<InflightGuard, ServiceError> {
        if self.is_shutting_down() {
            return Err(ServiceError::ServiceShutdown);
        }
        self.inflight.fetch_add(1, Ordering::AcqRel);
        Ok(InflightGuard {
            inflight: Arc::clone(&self.inflight),
        })
    }

    /// Sends a [`WorkRequest`] to the next worker in the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The service is shutting down (`shutdown_token` was cancelled).
    /// - The worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<(), ServiceError> {
        if self.shutdown_token.is_cancelled() {
            return Err(ServiceError::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        tokio::select! {
            () = self.shutdown_token.cancelled() => Err(ServiceError::ServiceShutdown),
            sent = worker.send(request) => sent.map_err(|_| ServiceError::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Refuses new requests.
    /// - Waits up to `shutdown_timeout` for in-flight requests to finish.
    /// - Cancels the shared [`CancellationToken`].
    /// - Sends a [`WorkRequest::Shutdown`] to each worker, which closes its
    ///   session, and waits (up to 3 seconds per worker) for the
    ///   acknowledgements.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        // === Phase 0: Stop accepting new requests ===
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");

        // === Phase 1: Wait for in-flight requests to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight requests ({} active)", self.inflight());
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight requests drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} requests still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {i}: {_e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Waiting for up to 3s per worker for shutdown acknowledgements");

        let timeout_futures = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(Duration::from_secs(3), rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}
