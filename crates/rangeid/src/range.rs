use core::fmt;

use crate::error::{Error, Result};

/// Default size of the total ID space.
pub const DEFAULT_MAX_LIMIT: u64 = 1_000;

/// Default number of IDs in one range.
pub const DEFAULT_RANGE_SIZE: u64 = 100;

/// A half-open interval `[start, end)` of the ID space.
///
/// Once dequeued from the pool a range belongs to exactly one instance and is
/// never handed out again, even if the instance dies before using it up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdRange {
    start: u64,
    end: u64,
}

impl IdRange {
    /// Creates a range covering `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `start > end`.
    pub const fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// First ID of the range.
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// One past the last issuable ID.
    pub const fn end(&self) -> u64 {
        self.end
    }

    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn contains(&self, id: u64) -> bool {
        self.start <= id && id < self.end
    }

    /// Returns `true` if the two ranges share at least one ID.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// How the ID space `[0, max_limit)` is cut into equal ranges.
///
/// A layout is only valid when `max_limit` is a non-zero multiple of a
/// non-zero `range_size`, so every ID belongs to exactly one full range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeLayout {
    max_limit: u64,
    range_size: u64,
}

impl RangeLayout {
    /// Validates and builds a layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] if either value is zero or
    /// `max_limit` is not a multiple of `range_size`.
    pub fn new(max_limit: u64, range_size: u64) -> Result<Self> {
        let reason = if range_size == 0 {
            Some("range_size must be greater than 0")
        } else if max_limit == 0 {
            Some("max_limit must be greater than 0")
        } else if max_limit % range_size != 0 {
            Some("max_limit must be a multiple of range_size")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidLayout {
                max_limit,
                range_size,
                reason,
            }),
            None => Ok(Self {
                max_limit,
                range_size,
            }),
        }
    }

    pub const fn max_limit(&self) -> u64 {
        self.max_limit
    }

    pub const fn range_size(&self) -> u64 {
        self.range_size
    }

    /// Number of ranges in the whole ID space.
    pub const fn range_count(&self) -> u64 {
        self.max_limit / self.range_size
    }

    /// The range beginning at `start`.
    pub const fn range_at(&self, start: u64) -> IdRange {
        IdRange::new(start, start + self.range_size)
    }

    /// Returns `true` if `start` is the first ID of some range of this layout.
    pub const fn is_range_start(&self, start: u64) -> bool {
        start < self.max_limit && start % self.range_size == 0
    }

    /// Start offsets of every range, ascending. This is the initial pool.
    pub fn starts(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.range_count()).map(move |i| i * self.range_size)
    }
}

impl Default for RangeLayout {
    fn default() -> Self {
        Self {
            max_limit: DEFAULT_MAX_LIMIT,
            range_size: DEFAULT_RANGE_SIZE,
        }
    }
}
