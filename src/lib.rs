pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod upload;

pub use api::{
    ApiError, ApiResult, CompletedPart, HttpBackend, HttpTransport, MultipartSession,
    PartTransport, PartUrl, RecordUpdate, SentCallback, UploadBackend,
};

pub use config::{ApiRoutes, LogLevel, UploaderConfig};

pub use error::{Result, UploadError};

pub use logging::init_logging;

pub use upload::{
    file_identifier, partition, parts_count, select_strategy, upload_part, PartDescriptor,
    PartRange, PartStatus, ProgressAggregator, ProgressObserver, ProgressSnapshot, SessionState,
    UploadOptions, UploadResult, UploadSession, UploadSource, UploadStrategy, Uploader,
    DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE,
};

pub use tokio_util::sync::CancellationToken;
