use std::sync::Arc;

use crate::{
    allocator::{PoolConfig, RangeAllocator},
    coordination::{Connector, Coordinator, RetryPolicy},
    dispenser::{IdDispenser, issue_next},
    error::Result,
    mutex::{Mutex, lock},
    range::IdRange,
};

/// A lock-based ID dispenser for multi-threaded use.
///
/// Clones share the same allocator (and therefore the same session and app
/// node) behind an [`Arc<Mutex<_>>`]. Issuance is serialized by the lock, so
/// IDs handed out by one instance stay strictly increasing within a range.
///
/// With the default `std` mutex a panic while holding the lock poisons it and
/// later calls fail with [`Error::LockPoisoned`]. The `parking-lot` feature
/// swaps in a mutex that never poisons.
///
/// [`Error::LockPoisoned`]: crate::Error::LockPoisoned
pub struct LockIdDispenser<C: Coordinator> {
    pub(crate) state: Arc<Mutex<RangeAllocator<C>>>,
}

impl<C: Coordinator> LockIdDispenser<C> {
    /// See [`BasicIdDispenser::connect`](crate::BasicIdDispenser::connect).
    pub fn connect<K>(connector: &K, retry: RetryPolicy, config: PoolConfig) -> Result<Self>
    where
        K: Connector<Session = C>,
    {
        RangeAllocator::bootstrap(connector, retry, config).map(Self::from_allocator)
    }

    pub fn from_allocator(allocator: RangeAllocator<C>) -> Self {
        Self {
            state: Arc::new(Mutex::new(allocator)),
        }
    }

    pub fn remaining(&self) -> Result<Vec<IdRange>> {
        lock!(self.state).pool().remaining()
    }

    /// Ends the shared session for every clone.
    pub fn close(&self) -> Result<()> {
        lock!(self.state).close()
    }
}

impl<C: Coordinator> Clone for LockIdDispenser<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Coordinator> IdDispenser for LockIdDispenser<C> {
    fn try_next_id(&self) -> Result<u64> {
        let mut allocator = lock!(self.state);
        issue_next(&mut allocator)
    }

    fn current_range(&self) -> Result<Option<IdRange>> {
        Ok(lock!(self.state).current_range())
    }
}
