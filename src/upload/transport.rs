//! Per-part transport
//!
//! Wraps one [`PartTransport::put_bytes`] call and maps its failure onto the
//! part it was writing. There is deliberately no retry here; a failed part
//! fails the session.

use crate::api::{PartTransport, SentCallback};
use crate::error::{Result, UploadError};
use bytes::Bytes;

/// Write one part and return its completion tag
///
/// # Errors
///
/// `PartUploadFailed` carrying `part_number` and the raw status when the
/// destination rejects the write or no response is received.
pub async fn upload_part<T>(
    transport: &T,
    part_number: u32,
    destination_url: &str,
    bytes: Bytes,
    on_sent: Option<SentCallback>,
) -> Result<String>
where
    T: PartTransport + ?Sized,
{
    if destination_url.is_empty() {
        return Err(UploadError::invalid_input(
            "destination_url",
            format!("Part {} has no destination URL", part_number),
        ));
    }

    if bytes.is_empty() {
        return Err(UploadError::invalid_input(
            "bytes",
            format!("Part {} is empty", part_number),
        ));
    }

    let length = bytes.len();
    log::debug!("part {}: writing {} bytes", part_number, length);

    match transport.put_bytes(destination_url, bytes, on_sent).await {
        Ok(tag) => {
            log::debug!("part {}: stored, tag {}", part_number, tag);
            Ok(tag)
        }
        Err(err) => {
            log::warn!(
                "part {}: write failed ({:?}): {}",
                part_number,
                err.status,
                err.message
            );
            Err(UploadError::part_upload_failed(
                part_number,
                err.status,
                err.message,
            ))
        }
    }
}
