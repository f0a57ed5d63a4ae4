//! Persisted formats for the pool node and the per-instance app nodes.
//!
//! - The pool node holds the remaining range start offsets as a JSON array,
//!   ascending (`[0,100,200]`). The range size is implied by the
//!   [`RangeLayout`].
//! - An app node holds `[cursor, range_end]` as two big-endian `u64`s.

use crate::{
    error::{Error, Result},
    range::RangeLayout,
};

/// Size in bytes of an encoded app node.
pub const NODE_RECORD_SIZE: usize = 2 * core::mem::size_of::<u64>();

/// The `(cursor, range_end)` pair stored in an app node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub cursor: u64,
    pub range_end: u64,
}

impl NodeRecord {
    pub const fn new(cursor: u64, range_end: u64) -> Self {
        Self { cursor, range_end }
    }

    pub const fn is_exhausted(&self) -> bool {
        self.cursor >= self.range_end
    }

    pub fn to_be_bytes(self) -> [u8; NODE_RECORD_SIZE] {
        let mut buf = [0_u8; NODE_RECORD_SIZE];
        buf[..8].copy_from_slice(&self.cursor.to_be_bytes());
        buf[8..].copy_from_slice(&self.range_end.to_be_bytes());
        buf
    }

    /// Decodes a node read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the length is wrong or the cursor
    /// lies past the range end.
    pub fn from_be_bytes(path: &str, bytes: &[u8]) -> Result<Self> {
        let buf: [u8; NODE_RECORD_SIZE] = bytes.try_into().map_err(|_| {
            Error::serialization(
                path,
                format!("expected {NODE_RECORD_SIZE} bytes, found {}", bytes.len()),
            )
        })?;
        let mut word = [0_u8; 8];
        word.copy_from_slice(&buf[..8]);
        let cursor = u64::from_be_bytes(word);
        word.copy_from_slice(&buf[8..]);
        let record = Self {
            cursor,
            range_end: u64::from_be_bytes(word),
        };
        if record.cursor > record.range_end {
            return Err(Error::serialization(
                path,
                format!(
                    "cursor {} lies past range end {}",
                    record.cursor, record.range_end
                ),
            ));
        }
        Ok(record)
    }
}

/// Encodes the remaining pool as a JSON array of range starts.
pub fn encode_pool(path: &str, starts: &[u64]) -> Result<Vec<u8>> {
    serde_json::to_vec(starts).map_err(|e| Error::serialization(path, e))
}

/// Decodes a pool node, checking every start against the layout.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the bytes are not a JSON array of
/// integers, an entry is not a range start of `layout`, or the entries are
/// not strictly ascending.
pub fn decode_pool(path: &str, bytes: &[u8], layout: &RangeLayout) -> Result<Vec<u64>> {
    let starts: Vec<u64> =
        serde_json::from_slice(bytes).map_err(|e| Error::serialization(path, e))?;

    if let Some(bad) = starts.iter().find(|s| !layout.is_range_start(**s)) {
        return Err(Error::serialization(
            path,
            format!(
                "{bad} is not a range start for max_limit {} / range_size {}",
                layout.max_limit(),
                layout.range_size()
            ),
        ));
    }
    if starts.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::serialization(path, "range starts are not ascending"));
    }
    Ok(starts)
}
