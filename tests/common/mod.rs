//! In-process backend and transport used by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use futures::future::BoxFuture;
use serde_json::json;
use signage_uploader::{
    ApiError, ApiResult, CancellationToken, CompletedPart, MultipartSession, PartTransport,
    PartUrl, RecordUpdate, SentCallback, UploadBackend,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STORAGE_HOST: &str = "https://storage.test";

#[derive(Debug, Default)]
pub struct BackendCalls {
    pub created: Vec<(String, String)>,
    pub part_urls: Vec<(String, String, u32)>,
    pub single_shot: Vec<(String, String)>,
    pub finalized: Vec<(String, String, Vec<CompletedPart>)>,
    pub notified: Vec<(String, RecordUpdate)>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub calls: Arc<Mutex<BackendCalls>>,
    pub fail_create: bool,
    pub fail_finalize: bool,
    pub fail_notify: bool,
    pub missing_part_url: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, BackendCalls> {
        self.calls.lock().unwrap()
    }
}

impl UploadBackend for MockBackend {
    fn create_multipart_session<'a>(
        &'a self,
        file_name: &'a str,
        file_type: &'a str,
    ) -> BoxFuture<'a, ApiResult<MultipartSession>> {
        Box::pin(async move {
            self.calls()
                .created
                .push((file_name.to_string(), file_type.to_string()));
            if self.fail_create {
                return Err(ApiError::status(500, "could not create upload"));
            }
            Ok(MultipartSession {
                session_token: format!("token-{}", file_name),
            })
        })
    }

    fn acquire_part_urls<'a>(
        &'a self,
        file_name: &'a str,
        session_token: &'a str,
        parts_count: u32,
    ) -> BoxFuture<'a, ApiResult<Vec<PartUrl>>> {
        Box::pin(async move {
            self.calls().part_urls.push((
                file_name.to_string(),
                session_token.to_string(),
                parts_count,
            ));
            let last = if self.missing_part_url {
                parts_count - 1
            } else {
                parts_count
            };
            // Returned newest first; the uploader must match them by number.
            Ok((1..=last)
                .rev()
                .map(|part_number| PartUrl {
                    part_number,
                    destination_url: format!(
                        "{}/{}?partNumber={}",
                        STORAGE_HOST, file_name, part_number
                    ),
                })
                .collect())
        })
    }

    fn acquire_single_shot_url<'a>(
        &'a self,
        file_name: &'a str,
        file_type: &'a str,
    ) -> BoxFuture<'a, ApiResult<String>> {
        Box::pin(async move {
            self.calls()
                .single_shot
                .push((file_name.to_string(), file_type.to_string()));
            Ok(format!("{}/{}", STORAGE_HOST, file_name))
        })
    }

    fn finalize_multipart_session<'a>(
        &'a self,
        file_name: &'a str,
        session_token: &'a str,
        parts: &'a [CompletedPart],
    ) -> BoxFuture<'a, ApiResult<serde_json::Value>> {
        Box::pin(async move {
            self.calls().finalized.push((
                file_name.to_string(),
                session_token.to_string(),
                parts.to_vec(),
            ));
            if self.fail_finalize {
                return Err(ApiError::status(400, "InvalidPart"));
            }
            Ok(json!({ "location": format!("{}/{}", STORAGE_HOST, file_name) }))
        })
    }

    fn notify_record_updated<'a>(
        &'a self,
        record_id: &'a str,
        update: &'a RecordUpdate,
    ) -> BoxFuture<'a, ApiResult<serde_json::Value>> {
        Box::pin(async move {
            self.calls()
                .notified
                .push((record_id.to_string(), update.clone()));
            if self.fail_notify {
                return Err(ApiError::status(404, "ad not found"));
            }
            Ok(json!({ "id": record_id }))
        })
    }
}

/// Transport that stores nothing and answers with `T<part number>` tags
#[derive(Clone, Default)]
pub struct MockTransport {
    /// (destination url, body length) for every write, in call order
    pub puts: Arc<Mutex<Vec<(String, usize)>>>,
    /// 1-based call index that answers with a 503
    pub fail_on_call: Option<usize>,
    /// Cancel this token once the given number of writes finished
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Sleep longer for lower part numbers so completions arrive out of order
    pub stagger: bool,
    /// Report body bytes through `on_sent` in this many slices
    pub progress_slices: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> Vec<(String, usize)> {
        self.puts.lock().unwrap().clone()
    }
}

pub fn part_number_of(url: &str) -> Option<u32> {
    url.split("partNumber=").nth(1).and_then(|n| n.parse().ok())
}

impl PartTransport for MockTransport {
    fn put_bytes<'a>(
        &'a self,
        destination_url: &'a str,
        body: Bytes,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'a, ApiResult<String>> {
        Box::pin(async move {
            let part_number = part_number_of(destination_url);

            if self.stagger {
                let delay = 40u64.saturating_sub(u64::from(part_number.unwrap_or(0)));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let call = {
                let mut puts = self.puts.lock().unwrap();
                puts.push((destination_url.to_string(), body.len()));
                puts.len()
            };

            if self.fail_on_call == Some(call) {
                return Err(ApiError::status(503, "Slow Down"));
            }

            if let (Some(slices), Some(on_sent)) = (self.progress_slices, on_sent) {
                let step = (body.len() / slices).max(1);
                let mut sent = 0;
                while sent < body.len() {
                    let n = step.min(body.len() - sent);
                    on_sent(n as u64);
                    sent += n;
                }
            }

            if let Some((after, ref token)) = self.cancel_after {
                if call >= after {
                    token.cancel();
                }
            }

            Ok(match part_number {
                Some(n) => format!("T{}", n),
                None => "T-whole".to_string(),
            })
        })
    }
}

/// `ad-<digits><ext>`
pub fn is_ad_identifier(identifier: &str, extension: &str) -> bool {
    identifier
        .strip_prefix("ad-")
        .and_then(|rest| rest.strip_suffix(extension))
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}
