//! Byte-range partitioning
//!
//! Splits a source of known size into contiguous, non-overlapping ranges that
//! are uploaded as independent parts.

use crate::error::{Result, UploadError};
use std::ops::Range;

/// Default size of every part except the last (5 MiB)
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// One contiguous byte range of the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number
    pub part_number: u32,
    /// Inclusive start offset
    pub start: u64,
    /// Exclusive end offset
    pub end: u64,
}

impl PartRange {
    /// Number of bytes covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// Number of parts `size_bytes` splits into
pub fn parts_count(size_bytes: u64, part_size: u64) -> Result<u32> {
    validate(size_bytes, part_size)?;
    let count = size_bytes.div_ceil(part_size);
    u32::try_from(count).map_err(|_| {
        UploadError::invalid_input(
            "part_size",
            format!("{} bytes would need {} parts", size_bytes, count),
        )
    })
}

/// Split `size_bytes` into ranges of `part_size` bytes, the last one holding
/// the remainder
///
/// # Errors
///
/// Returns `InvalidInput` when either argument is zero.
pub fn partition(size_bytes: u64, part_size: u64) -> Result<Vec<PartRange>> {
    let count = parts_count(size_bytes, part_size)?;

    Ok((0..count)
        .map(|index| {
            let start = u64::from(index) * part_size;
            PartRange {
                part_number: index + 1,
                start,
                end: (start + part_size).min(size_bytes),
            }
        })
        .collect())
}

fn validate(size_bytes: u64, part_size: u64) -> Result<()> {
    if size_bytes == 0 {
        return Err(UploadError::invalid_input(
            "size_bytes",
            "Cannot partition an empty source",
        ));
    }
    if part_size == 0 {
        return Err(UploadError::invalid_input(
            "part_size",
            "Part size must be greater than 0",
        ));
    }
    Ok(())
}
