use crate::{error::Result, range::IdRange};

/// A per-instance source of globally unique IDs.
pub trait IdDispenser {
    /// Returns the next ID of this instance, rotating to a fresh range when
    /// the current one is used up.
    ///
    /// # Errors
    ///
    /// Any coordination or allocation failure, notably
    /// [`Error::PoolExhausted`] once the ID space is spent. Errors are never
    /// swallowed; a failed call issues nothing.
    ///
    /// [`Error::PoolExhausted`]: crate::Error::PoolExhausted
    fn try_next_id(&self) -> Result<u64>;

    /// The range currently being drawn from.
    fn current_range(&self) -> Result<Option<IdRange>>;
}
