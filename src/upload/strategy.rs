//! Single-shot vs. multi-part selection

use serde::{Deserialize, Serialize};

/// Files strictly larger than this are uploaded in parts (50 MiB)
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 50 * 1024 * 1024;

/// How a source is written to its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// One PUT of the whole file to one destination URL
    SingleShot,
    /// One PUT per part, then a finalize call
    MultiPart,
}

impl UploadStrategy {
    pub fn is_multipart(self) -> bool {
        self == UploadStrategy::MultiPart
    }
}

impl std::fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStrategy::SingleShot => write!(f, "single-shot"),
            UploadStrategy::MultiPart => write!(f, "multi-part"),
        }
    }
}

/// Pick the strategy for a source of `size_bytes`
///
/// The boundary is exclusive: a file of exactly `threshold_bytes` is still
/// uploaded in one shot.
pub fn select_strategy(size_bytes: u64, threshold_bytes: u64) -> UploadStrategy {
    if size_bytes > threshold_bytes {
        UploadStrategy::MultiPart
    } else {
        UploadStrategy::SingleShot
    }
}
