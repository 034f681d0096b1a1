//! Upload pipeline
//!
//! This module splits a source into parts, selects the upload strategy,
//! writes the parts to pre-authorized destinations and tracks progress while
//! doing so.

pub mod partition;
pub mod progress;
pub mod session;
pub mod source;
pub mod strategy;
pub mod transport;
pub mod types;

pub use partition::{partition, parts_count, PartRange, DEFAULT_PART_SIZE};
pub use progress::{ProgressAggregator, ProgressObserver, ProgressSnapshot};
pub use session::Uploader;
pub use source::UploadSource;
pub use strategy::{select_strategy, UploadStrategy, DEFAULT_MULTIPART_THRESHOLD};
pub use transport::upload_part;
pub use types::{
    file_identifier, PartDescriptor, PartStatus, SessionState, UploadOptions, UploadResult,
    UploadSession,
};
