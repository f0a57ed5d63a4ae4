use rangeid::Result;
use tokio::sync::oneshot;

/// A unit of work sent to a worker task.
///
/// Replies travel back over a [`oneshot`] channel so the handler can await
/// the worker's answer without sharing its dispenser.
#[derive(Debug)]
pub enum WorkRequest {
    /// Issue one ID.
    NextId {
        response: oneshot::Sender<Result<u64>>,
    },
    /// Close the session and stop.
    Shutdown { response: oneshot::Sender<()> },
}
