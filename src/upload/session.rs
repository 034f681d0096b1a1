//! Upload session orchestration
//!
//! [`Uploader`] drives an [`UploadSession`] through
//! `Created -> UrlsAcquired -> Uploading -> Completed`, or into `Failed` as soon
//! as any step fails. The step functions can be called individually; the
//! high-level [`Uploader::upload`] runs them in order and then notifies the
//! domain record.
//!
//! Every backend and transport call is awaited before the next step starts.
//! When a cancellation token is supplied it is observed at each of those
//! suspension points.

use crate::api::http::build_client;
use crate::api::{
    ApiError, CompletedPart, HttpBackend, HttpTransport, PartTransport, RecordUpdate,
    SentCallback, UploadBackend,
};
use crate::config::UploaderConfig;
use crate::error::{Result, UploadError};
use crate::upload::partition::partition;
use crate::upload::progress::ProgressAggregator;
use crate::upload::source::UploadSource;
use crate::upload::strategy::{select_strategy, UploadStrategy};
use crate::upload::transport::upload_part;
use crate::upload::types::{
    file_identifier, PartDescriptor, PartStatus, SessionState, UploadOptions, UploadResult,
    UploadSession,
};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Runs upload sessions against a backend and a transport
pub struct Uploader<B, T> {
    config: UploaderConfig,
    backend: B,
    transport: T,
}

impl Uploader<HttpBackend, HttpTransport> {
    /// Uploader talking HTTP to the configured backend
    pub fn from_config(config: UploaderConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        let backend = HttpBackend::with_client(client.clone(), &config);
        Ok(Self::new(config, backend, HttpTransport::new(client)))
    }
}

impl<B, T> Uploader<B, T>
where
    B: UploadBackend,
    T: PartTransport,
{
    pub fn new(config: UploaderConfig, backend: B, transport: T) -> Self {
        Self {
            config,
            backend,
            transport,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload a file from disk
    pub async fn upload_file<P: AsRef<Path>>(
        &self,
        path: P,
        options: UploadOptions,
    ) -> Result<UploadResult> {
        let source = UploadSource::from_path(path).await?;
        self.upload(&source, options).await
    }

    /// Upload an in-memory buffer named `file_name`
    pub async fn upload_bytes<S, D>(
        &self,
        file_name: S,
        data: D,
        options: UploadOptions,
    ) -> Result<UploadResult>
    where
        S: Into<String>,
        D: Into<Bytes>,
    {
        let source = UploadSource::from_bytes(file_name, data);
        self.upload(&source, options).await
    }

    /// Run a complete session for `source`
    ///
    /// When `options.record_id` is set the record is notified after the upload
    /// completes; a `RecordUpdateFailed` error then means the file itself was
    /// stored successfully.
    pub async fn upload(
        &self,
        source: &UploadSource,
        options: UploadOptions,
    ) -> Result<UploadResult> {
        options.validate()?;
        let start_time = Instant::now();
        let cancel = options.cancel_token.as_ref();

        let checksum = if options.compute_checksum {
            Some(cancellable(cancel, "checksum", source.checksum_sha256()).await?)
        } else {
            None
        };

        let mut session = self.upload_init(source, &options).await?;
        log::info!(
            "uploading {} ({}) as {} using {} strategy",
            source.file_name(),
            bytesize::ByteSize::b(session.size_bytes),
            session.file_identifier,
            session.strategy
        );

        let progress = Arc::new(ProgressAggregator::new(session.size_bytes));
        if let Some(ref observer) = options.on_progress {
            progress.subscribe(observer.clone());
        }

        if let Err(err) = self.run(&mut session, source, &progress, &options).await {
            progress.halt();
            return Err(err);
        }

        let mut record_updated = false;
        if let Some(ref record_id) = options.record_id {
            self.upload_notify(&session, record_id, &options).await?;
            record_updated = true;
        }

        let duration = start_time.elapsed();
        log::info!(
            "upload of {} completed in {:.1}s",
            session.file_identifier,
            duration.as_secs_f64()
        );

        let mut result = UploadResult::new(
            session.file_identifier.clone(),
            session.size_bytes,
            session.strategy,
        )
        .duration_ms(duration_millis(duration))
        .checksum_sha256(checksum)
        .record_updated(record_updated);
        if session.strategy.is_multipart() {
            result = result.parts(session.parts.len());
        }
        Ok(result)
    }

    async fn run(
        &self,
        session: &mut UploadSession,
        source: &UploadSource,
        progress: &Arc<ProgressAggregator>,
        options: &UploadOptions,
    ) -> Result<()> {
        self.upload_acquire_urls(session, source, options).await?;
        self.upload_transfer(session, source, progress, options)
            .await?;
        self.upload_finalize(session, options).await
    }

    /// Create a session in the `Created` state
    ///
    /// Chooses the strategy, generates the file identifier and, for
    /// multi-part sessions, partitions the source and obtains the session
    /// token. A failure here leaves nothing to unwind.
    pub async fn upload_init(
        &self,
        source: &UploadSource,
        options: &UploadOptions,
    ) -> Result<UploadSession> {
        options.validate()?;

        let size_bytes = source.size();
        if size_bytes == 0 {
            return Err(UploadError::invalid_input(
                "size_bytes",
                format!("{} is empty", source.file_name()),
            ));
        }

        let strategy = select_strategy(size_bytes, self.config.multipart_threshold);
        let file_identifier = file_identifier(
            &self.config.file_prefix,
            source.file_name(),
            chrono::Utc::now().timestamp_millis(),
        );

        let (session_token, parts) = match strategy {
            UploadStrategy::SingleShot => (None, Vec::new()),
            UploadStrategy::MultiPart => {
                let parts: Vec<PartDescriptor> = partition(size_bytes, self.config.part_size)?
                    .into_iter()
                    .map(PartDescriptor::from)
                    .collect();

                let created = cancellable(options.cancel_token.as_ref(), "create session", async {
                    self.backend
                        .create_multipart_session(&file_identifier, source.content_type())
                        .await
                        .map_err(|e| UploadError::session_create_failed(describe(&e)))
                })
                .await?;

                if created.session_token.is_empty() {
                    return Err(UploadError::session_create_failed(
                        "backend returned an empty session token",
                    ));
                }
                (Some(created.session_token), parts)
            }
        };

        log::debug!(
            "session {} created: {} bytes, {} parts",
            file_identifier,
            size_bytes,
            parts.len()
        );

        Ok(UploadSession {
            file_identifier,
            size_bytes,
            strategy,
            session_token,
            destination_url: None,
            parts,
            state: SessionState::Created,
        })
    }

    /// Acquire every destination URL up front: `Created -> UrlsAcquired`
    pub async fn upload_acquire_urls(
        &self,
        session: &mut UploadSession,
        source: &UploadSource,
        options: &UploadOptions,
    ) -> Result<()> {
        session.expect_state(SessionState::Created)?;
        let cancel = options.cancel_token.as_ref();

        match session.strategy {
            UploadStrategy::SingleShot => {
                let result = cancellable(cancel, "acquire upload url", async {
                    self.backend
                        .acquire_single_shot_url(&session.file_identifier, source.content_type())
                        .await
                        .map_err(|e| UploadError::session_create_failed(describe(&e)))
                })
                .await;

                match result {
                    Ok(url) => session.destination_url = Some(url),
                    Err(err) => return fail(session, err),
                }
            }
            UploadStrategy::MultiPart => {
                let Some(token) = session.session_token.clone() else {
                    return fail(
                        session,
                        UploadError::invalid_state("session token", "no session token"),
                    );
                };
                let parts_count = session.parts.len() as u32;

                let result = cancellable(cancel, "acquire part urls", async {
                    self.backend
                        .acquire_part_urls(&session.file_identifier, &token, parts_count)
                        .await
                        .map_err(|e| UploadError::session_create_failed(describe(&e)))
                })
                .await;

                let urls = match result {
                    Ok(urls) => urls,
                    Err(err) => return fail(session, err),
                };

                if let Err(err) = assign_part_urls(&mut session.parts, urls) {
                    return fail(session, err);
                }
            }
        }

        session.state = SessionState::UrlsAcquired;
        Ok(())
    }

    /// Write the data: `UrlsAcquired -> Uploading`
    ///
    /// A single-shot session moves straight on to `Completed`. A multi-part
    /// session stays in `Uploading` with every part `Done` until
    /// [`Uploader::upload_finalize`] is called.
    pub async fn upload_transfer(
        &self,
        session: &mut UploadSession,
        source: &UploadSource,
        progress: &Arc<ProgressAggregator>,
        options: &UploadOptions,
    ) -> Result<()> {
        session.expect_state(SessionState::UrlsAcquired)?;
        session.state = SessionState::Uploading;
        progress.reset_clock();

        let result = match session.strategy {
            UploadStrategy::SingleShot => {
                self.transfer_single_shot(session, source, progress, options)
                    .await
            }
            UploadStrategy::MultiPart => {
                self.transfer_parts(session, source, progress, options)
                    .await
            }
        };

        if let Err(err) = result {
            progress.halt();
            return fail(session, err);
        }
        Ok(())
    }

    async fn transfer_single_shot(
        &self,
        session: &mut UploadSession,
        source: &UploadSource,
        progress: &Arc<ProgressAggregator>,
        options: &UploadOptions,
    ) -> Result<()> {
        let cancel = options.cancel_token.as_ref();
        let url = session
            .destination_url
            .clone()
            .ok_or_else(|| UploadError::invalid_state("destination url", "none acquired"))?;

        let bytes = cancellable(cancel, "read source", source.read_all()).await?;

        let sink = progress.clone();
        let on_sent: SentCallback = Arc::new(move |sent| {
            sink.record(sent);
        });

        cancellable(
            cancel,
            "upload",
            upload_part(&self.transport, 1, &url, bytes, Some(on_sent)),
        )
        .await?;

        progress.record_remaining();
        session.state = SessionState::Completed;
        Ok(())
    }

    async fn transfer_parts(
        &self,
        session: &mut UploadSession,
        source: &UploadSource,
        progress: &Arc<ProgressAggregator>,
        options: &UploadOptions,
    ) -> Result<()> {
        let cancel = options.cancel_token.as_ref();
        let concurrency = options.concurrency.max(1);
        let mut pending = 0..session.parts.len();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < concurrency {
                let Some(index) = pending.next() else {
                    break;
                };

                let part = &mut session.parts[index];
                part.status = PartStatus::InFlight;
                let part_number = part.part_number;
                let range = part.byte_range.clone();
                let url = part.destination_url.clone().unwrap_or_default();
                let transport = &self.transport;

                in_flight.push(async move {
                    let result = async {
                        let bytes = source.read_range(range).await?;
                        upload_part(transport, part_number, &url, bytes, None).await
                    }
                    .await;
                    (index, result)
                });
            }

            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        release_in_flight(&mut session.parts);
                        return Err(UploadError::cancelled("upload part"));
                    }
                    next = in_flight.next() => next,
                },
                None => in_flight.next().await,
            };

            let Some((index, result)) = next else {
                break;
            };

            let part = &mut session.parts[index];
            match result {
                Ok(tag) => {
                    part.status = PartStatus::Done;
                    part.completion_tag = Some(tag);
                    progress.record(part.len());
                }
                Err(err) => {
                    part.status = PartStatus::Failed;
                    release_in_flight(&mut session.parts);
                    return Err(err);
                }
            }
        }

        log::debug!(
            "session {}: {} parts written",
            session.file_identifier,
            session.parts_done()
        );
        Ok(())
    }

    /// Complete a multi-part session: `Uploading -> Completed`
    ///
    /// Completion tags are submitted in ascending part order. For a
    /// single-shot session, which is already `Completed`, this is a no-op.
    pub async fn upload_finalize(
        &self,
        session: &mut UploadSession,
        options: &UploadOptions,
    ) -> Result<()> {
        if session.strategy == UploadStrategy::SingleShot {
            return session.expect_state(SessionState::Completed);
        }

        session.expect_state(SessionState::Uploading)?;
        if session.parts_done() != session.parts.len() {
            return Err(UploadError::invalid_state(
                "all parts done",
                format!("{} of {} parts done", session.parts_done(), session.parts.len()),
            ));
        }

        let Some(token) = session.session_token.clone() else {
            return fail(
                session,
                UploadError::invalid_state("session token", "no session token"),
            );
        };
        let completed = completed_parts(&session.parts);

        let result = cancellable(options.cancel_token.as_ref(), "finalize", async {
            self.backend
                .finalize_multipart_session(&session.file_identifier, &token, &completed)
                .await
                .map_err(|e| UploadError::finalize_failed(describe(&e)))
        })
        .await;

        match result {
            Ok(_) => {
                session.state = SessionState::Completed;
                Ok(())
            }
            Err(err) => fail(session, err),
        }
    }

    /// Point `record_id` at the uploaded file
    pub async fn upload_notify(
        &self,
        session: &UploadSession,
        record_id: &str,
        options: &UploadOptions,
    ) -> Result<()> {
        session.expect_state(SessionState::Completed)?;

        let update = RecordUpdate {
            file_identifier: session.file_identifier.clone(),
            is_multipart_upload: session.strategy.is_multipart(),
        };

        cancellable(options.cancel_token.as_ref(), "record update", async {
            self.backend
                .notify_record_updated(record_id, &update)
                .await
                .map(|_| ())
                .map_err(|e| {
                    log::warn!("record {} was not updated: {}", record_id, e);
                    UploadError::record_update_failed(record_id, describe(&e))
                })
        })
        .await
    }
}

/// Await `future` unless `cancel` fires first
async fn cancellable<F, R>(
    cancel: Option<&CancellationToken>,
    operation: &str,
    future: F,
) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(UploadError::cancelled(operation)),
            result = future => result,
        },
        None => future.await,
    }
}

fn fail<R>(session: &mut UploadSession, err: UploadError) -> Result<R> {
    log::warn!("session {} failed: {}", session.file_identifier, err);
    session.state = SessionState::Failed;
    Err(err)
}

/// Parts dropped while in flight were never confirmed
fn release_in_flight(parts: &mut [PartDescriptor]) {
    for part in parts
        .iter_mut()
        .filter(|part| part.status == PartStatus::InFlight)
    {
        part.status = PartStatus::Pending;
    }
}

fn assign_part_urls(
    parts: &mut [PartDescriptor],
    urls: Vec<crate::api::PartUrl>,
) -> Result<()> {
    if urls.len() != parts.len() {
        return Err(UploadError::session_create_failed(format!(
            "backend returned {} part URLs for {} parts",
            urls.len(),
            parts.len()
        )));
    }

    let mut by_number: HashMap<u32, String> = urls
        .into_iter()
        .map(|url| (url.part_number, url.destination_url))
        .collect();

    for part in parts.iter_mut() {
        match by_number.remove(&part.part_number) {
            Some(url) if !url.is_empty() => part.destination_url = Some(url),
            _ => {
                return Err(UploadError::session_create_failed(format!(
                    "backend returned no URL for part {}",
                    part.part_number
                )))
            }
        }
    }
    Ok(())
}

/// Completion tags ordered by part number
fn completed_parts(parts: &[PartDescriptor]) -> Vec<CompletedPart> {
    let mut completed: Vec<CompletedPart> = parts
        .iter()
        .map(|part| CompletedPart {
            completion_tag: part.completion_tag.clone().unwrap_or_default(),
            part_number: part.part_number,
        })
        .collect();
    completed.sort_by_key(|part| part.part_number);
    completed
}

/// Whole milliseconds, saturating at `u64::MAX`
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn describe(err: &ApiError) -> String {
    match err.status {
        Some(status) => format!("status {}: {}", status, err.message),
        None => err.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PartUrl;

    fn descriptors(count: u32) -> Vec<PartDescriptor> {
        partition(u64::from(count) * 10, 10)
            .unwrap()
            .into_iter()
            .map(PartDescriptor::from)
            .collect()
    }

    #[test]
    fn test_assign_part_urls_out_of_order() {
        let mut parts = descriptors(3);
        let urls = vec![
            PartUrl {
                part_number: 3,
                destination_url: "u3".to_string(),
            },
            PartUrl {
                part_number: 1,
                destination_url: "u1".to_string(),
            },
            PartUrl {
                part_number: 2,
                destination_url: "u2".to_string(),
            },
        ];

        assign_part_urls(&mut parts, urls).unwrap();
        let assigned: Vec<_> = parts
            .iter()
            .map(|p| p.destination_url.clone().unwrap())
            .collect();
        assert_eq!(assigned, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn test_assign_part_urls_rejects_mismatch() {
        let mut parts = descriptors(2);
        let short = vec![PartUrl {
            part_number: 1,
            destination_url: "u1".to_string(),
        }];
        assert!(matches!(
            assign_part_urls(&mut parts, short),
            Err(UploadError::SessionCreateFailed { .. })
        ));

        let duplicated = vec![
            PartUrl {
                part_number: 1,
                destination_url: "u1".to_string(),
            },
            PartUrl {
                part_number: 1,
                destination_url: "u1b".to_string(),
            },
        ];
        assert!(assign_part_urls(&mut parts, duplicated).is_err());
    }

    #[test]
    fn test_completed_parts_sorted() {
        let mut parts = descriptors(3);
        parts.reverse();
        for part in parts.iter_mut() {
            part.completion_tag = Some(format!("T{}", part.part_number));
        }

        let completed = completed_parts(&parts);
        let numbers: Vec<_> = completed.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(completed[0].completion_tag, "T1");
    }

    #[test]
    fn test_release_in_flight() {
        let mut parts = descriptors(3);
        parts[0].status = PartStatus::Done;
        parts[1].status = PartStatus::InFlight;
        release_in_flight(&mut parts);
        assert_eq!(parts[0].status, PartStatus::Done);
        assert_eq!(parts[1].status, PartStatus::Pending);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&ApiError::status(500, "boom")), "status 500: boom");
        assert_eq!(describe(&ApiError::transport("refused")), "refused");
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_cancellable() {
        let token = CancellationToken::new();
        let ok: Result<u8> = cancellable(Some(&token), "noop", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        token.cancel();
        let cancelled: Result<u8> = cancellable(Some(&token), "noop", async { Ok(1) }).await;
        assert!(matches!(cancelled, Err(UploadError::Cancelled { .. })));
    }
}
