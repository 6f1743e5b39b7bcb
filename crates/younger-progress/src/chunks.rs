//! Work splitting helpers.
//!
//! The number of chunks handed to workers must match the `expected_workers`
//! passed to [`crate::ProgressManager::run`], so callers split with
//! [`split_even`] and use the returned length.

use crate::error::{ProgressError, Result};
use std::ops::Range;

/// Split `0..len` into `chunk_count` contiguous ranges as evenly as possible.
///
/// The first `len % chunk_count` chunks get one extra item.
pub fn split_even(len: u64, chunk_count: u64) -> Result<Vec<Range<u64>>> {
    if chunk_count == 0 || chunk_count > len {
        return Err(ProgressError::config(
            "chunk_count",
            format!("must be in 1..={}, got {}", len, chunk_count),
        ));
    }

    let (q, r) = (len / chunk_count, len % chunk_count);
    let mut chunks = Vec::with_capacity(chunk_count as usize);
    let mut start = 0;
    for i in 0..chunk_count {
        let size = if i < r { q + 1 } else { q };
        chunks.push(start..start + size);
        start += size;
    }
    Ok(chunks)
}
