use crate::server::{pool::request::WorkRequest, service::config::Dispenser};
use rangeid::IdDispenser;
use tokio::sync::mpsc;

/// Worker task responsible for processing [`WorkRequest`] messages.
///
/// Each worker owns one [`Dispenser`], i.e. one coordination session, one app
/// node and one range at a time. The worker listens on an MPSC channel and
/// processes requests until a shutdown signal is received or every sender is
/// gone. Either way the session ends with the worker, and whatever is left of
/// its range is never issued.
///
/// Coordination calls may sleep between retries, so each one runs on the
/// blocking pool with the dispenser moved in and handed back.
///
/// # Request Types
///
/// - [`WorkRequest::NextId`]: issue one ID.
/// - [`WorkRequest::Shutdown`]: close the session and acknowledge.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    mut dispenser: Dispenser,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::NextId { response } => {
                let Some((returned, result)) =
                    run_blocking(dispenser, |dispenser| dispenser.try_next_id()).await
                else {
                    // The dispenser went down with the panicked job and its
                    // session with it; the caller sees the reply dropped.
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} lost its dispenser");
                    break;
                };
                dispenser = returned;

                #[cfg(feature = "tracing")]
                {
                    if let Err(e) = &result {
                        tracing::error!(worker_id, "failed to issue ID: {e}");
                    }
                }

                if response.send(result).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id}: caller went away, ID discarded");
                }
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if let Err(_e) = dispenser.close() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to close its session: {_e}");
                }

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

/// Runs `op` against `dispenser` on tokio's blocking pool.
///
/// Returns `None` if `op` panicked, in which case the dispenser is gone.
async fn run_blocking<T, F>(dispenser: Dispenser, op: F) -> Option<(Dispenser, T)>
where
    T: Send + 'static,
    F: FnOnce(&Dispenser) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let out = op(&dispenser);
        (dispenser, out)
    })
    .await
    .ok()
}
