//! `reqwest` implementations of the backend and transport seams

use super::types::{
    FileDescriptor, FinalizeRequest, MultipartSession, PartUrl, PartUrlsRequest,
    PartUrlsResponse, RecordUpdate, SingleShotUrlResponse,
};
use super::{ApiError, ApiResult, CompletedPart, PartTransport, SentCallback, UploadBackend};
use crate::config::{ApiRoutes, UploaderConfig};
use crate::error::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::Stream;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, ETAG};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Size of the frames a streamed body is cut into
const BODY_FRAME_SIZE: usize = 64 * 1024;

/// Build the HTTP client shared by the backend and the transport
pub fn build_client(config: &UploaderConfig) -> Result<Client> {
    let mut builder =
        Client::builder().user_agent(concat!("signage-uploader/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(Duration::from_secs(timeout));
    }
    Ok(builder.build()?)
}

/// JSON REST backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    routes: ApiRoutes,
}

impl HttpBackend {
    /// Create a backend with its own client
    pub fn new(config: &UploaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_client(build_client(config)?, config))
    }

    /// Create a backend reusing an existing client
    pub fn with_client(client: Client, config: &UploaderConfig) -> Self {
        Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            routes: config.routes.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<String> {
        let url = self.url(path);
        log::debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url).json(body);
        if let Some(ref token) = self.api_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::status(
                status.as_u16(),
                error_message(status, &text),
            ));
        }
        Ok(text)
    }

    async fn send_for<B, T>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.send(method, path, body).await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::transport(format!("invalid response from {}: {}", path, e)))
    }

    async fn send_for_value<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<serde_json::Value> {
        let text = self.send(method, path, body).await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    }
}

impl UploadBackend for HttpBackend {
    fn create_multipart_session<'a>(
        &'a self,
        file_name: &'a str,
        file_type: &'a str,
    ) -> BoxFuture<'a, ApiResult<MultipartSession>> {
        Box::pin(async move {
            let body = FileDescriptor {
                file_name: file_name.to_string(),
                file_type: file_type.to_string(),
            };
            self.send_for(Method::POST, &self.routes.create_multipart, &body)
                .await
        })
    }

    fn acquire_part_urls<'a>(
        &'a self,
        file_name: &'a str,
        session_token: &'a str,
        parts_count: u32,
    ) -> BoxFuture<'a, ApiResult<Vec<PartUrl>>> {
        Box::pin(async move {
            let body = PartUrlsRequest {
                file_name: file_name.to_string(),
                session_token: session_token.to_string(),
                parts_count,
            };
            let response: PartUrlsResponse = self
                .send_for(Method::POST, &self.routes.part_urls, &body)
                .await?;
            Ok(response.urls)
        })
    }

    fn acquire_single_shot_url<'a>(
        &'a self,
        file_name: &'a str,
        file_type: &'a str,
    ) -> BoxFuture<'a, ApiResult<String>> {
        Box::pin(async move {
            let body = FileDescriptor {
                file_name: file_name.to_string(),
                file_type: file_type.to_string(),
            };
            let response: SingleShotUrlResponse = self
                .send_for(Method::POST, &self.routes.single_shot_url, &body)
                .await?;
            Ok(response.url)
        })
    }

    fn finalize_multipart_session<'a>(
        &'a self,
        file_name: &'a str,
        session_token: &'a str,
        parts: &'a [CompletedPart],
    ) -> BoxFuture<'a, ApiResult<serde_json::Value>> {
        Box::pin(async move {
            let body = FinalizeRequest {
                file_name: file_name.to_string(),
                session_token: session_token.to_string(),
                parts: parts.to_vec(),
            };
            self.send_for_value(Method::POST, &self.routes.complete_multipart, &body)
                .await
        })
    }

    fn notify_record_updated<'a>(
        &'a self,
        record_id: &'a str,
        update: &'a RecordUpdate,
    ) -> BoxFuture<'a, ApiResult<serde_json::Value>> {
        Box::pin(async move {
            let path = self.routes.record_update_path(record_id);
            self.send_for_value(Method::PUT, &path, update).await
        })
    }
}

/// Writes parts with one `PUT` each and reads the `ETag` header
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PartTransport for HttpTransport {
    fn put_bytes<'a>(
        &'a self,
        destination_url: &'a str,
        body: Bytes,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'a, ApiResult<String>> {
        Box::pin(async move {
            let length = body.len() as u64;
            let request = self
                .client
                .put(destination_url)
                .header(CONTENT_LENGTH, length);
            let request = match on_sent {
                Some(on_sent) => {
                    request.body(reqwest::Body::wrap_stream(framed_body(body, on_sent)))
                }
                None => request.body(body),
            };

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ApiError::status(
                    status.as_u16(),
                    error_message(status, &text),
                ));
            }

            response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    ApiError::status(status.as_u16(), "response carried no ETag header")
                })
        })
    }
}

/// Cut `body` into frames, reporting each one as it is handed over
fn framed_body(
    body: Bytes,
    on_sent: SentCallback,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static {
    let frames: Vec<Bytes> = (0..body.len())
        .step_by(BODY_FRAME_SIZE)
        .map(|start| body.slice(start..(start + BODY_FRAME_SIZE).min(body.len())))
        .collect();

    futures::stream::iter(frames.into_iter().map(move |frame| {
        on_sent(frame.len() as u64);
        Ok(frame)
    }))
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Best human-readable message for a failed response
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        });

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
