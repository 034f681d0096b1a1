//! Wire types exchanged with the backend

use serde::{Deserialize, Serialize};

/// Request body for session creation and single-shot URL acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_name: String,
    pub file_type: String,
}

/// A multi-part session issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSession {
    #[serde(alias = "uploadId")]
    pub session_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlsRequest {
    pub file_name: String,
    pub session_token: String,
    pub parts_count: u32,
}

/// Destination URL for one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    pub part_number: u32,
    #[serde(rename = "url", alias = "signedUrl", alias = "destinationUrl")]
    pub destination_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUrlsResponse {
    pub urls: Vec<PartUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleShotUrlResponse {
    #[serde(alias = "signedUrl", alias = "destinationUrl")]
    pub url: String,
}

/// A written part, as submitted to finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    #[serde(rename = "etag")]
    pub completion_tag: String,
    pub part_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub file_name: String,
    pub session_token: String,
    pub parts: Vec<CompletedPart>,
}

/// Tells a domain record (an ad) that its backing file changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(rename = "fileName")]
    pub file_identifier: String,
    pub is_multipart_upload: bool,
}
