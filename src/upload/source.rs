//! Read-only upload sources
//!
//! A source is either a file on disk or an in-memory buffer. Parts read
//! disjoint ranges, and the file is reopened for every read so no handle is
//! shared between parts.

use crate::error::{Result, UploadError};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CHECKSUM_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
enum SourceData {
    File(PathBuf),
    Memory(Bytes),
}

/// Data to upload, with the metadata the backend needs
#[derive(Debug, Clone)]
pub struct UploadSource {
    file_name: String,
    content_type: String,
    size: u64,
    data: SourceData,
}

impl UploadSource {
    /// Open a file source; size is taken from the file metadata
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            UploadError::invalid_input(
                "filepath",
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;

        if !metadata.is_file() {
            return Err(UploadError::invalid_input(
                "filepath",
                format!("{} is not a regular file", path.display()),
            ));
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            content_type: content_type_for(&file_name).to_string(),
            file_name,
            size: metadata.len(),
            data: SourceData::File(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory buffer
    pub fn from_bytes<S: Into<String>, B: Into<Bytes>>(file_name: S, bytes: B) -> Self {
        let file_name = file_name.into();
        let bytes = bytes.into();
        Self {
            content_type: content_type_for(&file_name).to_string(),
            file_name,
            size: bytes.len() as u64,
            data: SourceData::Memory(bytes),
        }
    }

    /// Override the detected content type
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Original file name, used to derive the extension of the identifier
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            SourceData::File(path) => Some(path),
            SourceData::Memory(_) => None,
        }
    }

    /// Read exactly the bytes in `range`
    pub async fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        if range.start > range.end || range.end > self.size {
            return Err(UploadError::invalid_input(
                "range",
                format!(
                    "{}..{} is outside a source of {} bytes",
                    range.start, range.end, self.size
                ),
            ));
        }

        match &self.data {
            SourceData::Memory(bytes) => Ok(bytes.slice(range.start as usize..range.end as usize)),
            SourceData::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(range.start)).await?;
                let mut buffer = vec![0u8; (range.end - range.start) as usize];
                file.read_exact(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }

    /// Read the whole source
    pub async fn read_all(&self) -> Result<Bytes> {
        self.read_range(0..self.size).await
    }

    /// Hex-encoded SHA-256 of the source contents
    pub async fn checksum_sha256(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        match &self.data {
            SourceData::Memory(bytes) => hasher.update(bytes),
            SourceData::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];
                loop {
                    let n = file.read(&mut buffer).await?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Extension of `file_name` including the leading dot, or "" when it has none
pub fn extension_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(index) => &file_name[index..],
    }
}

/// MIME type for the media kinds the console handles
pub fn content_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).to_ascii_lowercase().as_str() {
        ".mp4" | ".m4v" => "video/mp4",
        ".webm" => "video/webm",
        ".mov" => "video/quicktime",
        ".mkv" => "video/x-matroska",
        ".avi" => "video/x-msvideo",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".svg" => "image/svg+xml",
        ".apk" => "application/vnd.android.package-archive",
        ".json" => "application/json",
        ".txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
