/// A result type defaulting to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `rangeid` can emit.
///
/// Variants fall into three groups:
///
/// - coordination failures reported by a [`Coordinator`] backend
///   (`Connection`, `Conflict`, `NoNode`, `NodeExists`, `SessionExpired`),
/// - allocation outcomes (`PoolExhausted`, `Serialization`, `InvalidLayout`),
/// - local misuse or lock failures (`NotRegistered`, `AlreadyRegistered`,
///   `LockPoisoned`).
///
/// Only [`Error::Connection`] is considered transient; see
/// [`Error::is_retryable`].
///
/// [`Coordinator`]: crate::Coordinator
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The coordination service could not be reached.
    #[error("coordination service unreachable at `{endpoint}`: {reason}")]
    Connection { endpoint: String, reason: String },

    /// A conditional write lost an optimistic concurrency race.
    #[error("version conflict on `{path}`: expected {expected}, found {actual}")]
    Conflict {
        path: String,
        expected: u32,
        actual: u32,
    },

    /// No unclaimed ranges are left in the pool.
    #[error("range pool at `{path}` is exhausted")]
    PoolExhausted { path: String },

    /// Persisted pool or node bytes could not be decoded.
    #[error("unreadable data at `{path}`: {reason}")]
    Serialization { path: String, reason: String },

    /// The path, or the parent of a path being created, does not exist.
    #[error("no node at `{path}`")]
    NoNode { path: String },

    /// A persistent node already exists at the path.
    #[error("node already exists at `{path}`")]
    NodeExists { path: String },

    /// The coordination session has ended; its ephemeral nodes are gone.
    #[error("coordination session {session} has expired")]
    SessionExpired { session: u64 },

    /// An allocator operation needs a registered app node.
    #[error("instance has not registered an app node")]
    NotRegistered,

    /// The allocator already owns an app node.
    #[error("instance is already registered at `{path}`")]
    AlreadyRegistered { path: String },

    /// `max_limit`/`range_size` do not describe a valid partition.
    #[error("invalid range layout (max_limit = {max_limit}, range_size = {range_size}): {reason}")]
    InvalidLayout {
        max_limit: u64,
        range_size: u64,
        reason: &'static str,
    },

    /// A thread panicked while holding the dispenser lock.
    #[error("dispenser lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` if the operation may succeed when simply attempted
    /// again later.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub(crate) fn serialization(path: &str, reason: impl core::fmt::Display) -> Self {
        Self::Serialization {
            path: path.to_owned(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
use std::sync::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
// Any poisoned guard collapses into `LockPoisoned`
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
