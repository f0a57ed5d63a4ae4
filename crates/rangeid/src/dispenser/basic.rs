use core::cell::RefCell;

use crate::{
    allocator::{PoolConfig, RangeAllocator},
    coordination::{Connector, Coordinator, RetryPolicy},
    dispenser::{IdDispenser, issue_next},
    error::Result,
    range::IdRange,
};

/// A single-threaded ID dispenser.
///
/// The allocator sits in a [`RefCell`], so calls take `&self` but the
/// dispenser is neither `Sync` nor meant to be shared. Every ID still goes
/// through a versioned read and a conditional write of the app node, which
/// makes this a good fit for one dispenser per worker thread or task.
///
/// ## See Also
/// - [`LockIdDispenser`]
///
/// [`LockIdDispenser`]: crate::dispenser::LockIdDispenser
pub struct BasicIdDispenser<C: Coordinator> {
    allocator: RefCell<RangeAllocator<C>>,
}

impl<C: Coordinator> BasicIdDispenser<C> {
    /// Brings an instance up: connects, creates the pool if needed and claims
    /// a first range.
    ///
    /// # Example
    /// ```
    /// use rangeid::{BasicIdDispenser, IdDispenser, MemoryStore, PoolConfig, RetryPolicy};
    ///
    /// let store = MemoryStore::new();
    /// let dispenser =
    ///     BasicIdDispenser::connect(&store, RetryPolicy::default(), PoolConfig::default())?;
    ///
    /// assert_eq!(dispenser.try_next_id()?, 0);
    /// assert_eq!(dispenser.try_next_id()?, 1);
    /// # Ok::<(), rangeid::Error>(())
    /// ```
    pub fn connect<K>(connector: &K, retry: RetryPolicy, config: PoolConfig) -> Result<Self>
    where
        K: Connector<Session = C>,
    {
        RangeAllocator::bootstrap(connector, retry, config).map(Self::from_allocator)
    }

    /// Wraps an allocator. It does not need to be registered yet, but
    /// [`IdDispenser::try_next_id`] fails with
    /// [`Error::NotRegistered`](crate::Error::NotRegistered) until it is.
    pub const fn from_allocator(allocator: RangeAllocator<C>) -> Self {
        Self {
            allocator: RefCell::new(allocator),
        }
    }

    /// Ranges still unclaimed in the shared pool.
    pub fn remaining(&self) -> Result<Vec<IdRange>> {
        self.allocator.borrow().pool().remaining()
    }

    /// Ends the session. Unissued IDs of the current range are abandoned.
    pub fn close(&self) -> Result<()> {
        self.allocator.borrow_mut().close()
    }

    pub fn into_allocator(self) -> RangeAllocator<C> {
        self.allocator.into_inner()
    }
}

impl<C: Coordinator> IdDispenser for BasicIdDispenser<C> {
    fn try_next_id(&self) -> Result<u64> {
        issue_next(&mut self.allocator.borrow_mut())
    }

    fn current_range(&self) -> Result<Option<IdRange>> {
        Ok(self.allocator.borrow().current_range())
    }
}
