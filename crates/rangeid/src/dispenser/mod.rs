mod basic;
mod interface;
mod lock;
#[cfg(test)]
mod tests;

pub use basic::*;
pub use interface::*;
pub use lock::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::RangeAllocator, codec::NodeRecord, coordination::Coordinator, error::Result,
};

/// Issues one ID from the allocator's app node.
///
/// The persisted cursor is the source of truth: it is read, issued and
/// advanced with a conditional write. A cursor equal to the range end means
/// the range is spent (the end itself is never issued), so the allocator
/// rotates and issuance continues from the new range start.
///
/// Each read and conditional write pair is retried as a unit under the
/// allocator's [`RetryPolicy`](crate::RetryPolicy), so a retry always starts
/// from a fresh read.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip(allocator)))]
pub(crate) fn issue_next<C: Coordinator>(allocator: &mut RangeAllocator<C>) -> Result<u64> {
    let retry = allocator.retry();
    loop {
        let issued = retry.run(|_| {
            let (record, version) = allocator.read_record()?;
            if record.is_exhausted() {
                #[cfg(feature = "tracing")]
                tracing::debug!(range_end = record.range_end, "range exhausted");
                return Ok(None);
            }
            let id = record.cursor;
            allocator.write_record(NodeRecord::new(id + 1, record.range_end), version)?;
            Ok(Some(id))
        })?;

        if let Some(id) = issued {
            return Ok(id);
        }
        allocator.rotate()?;
    }
}
