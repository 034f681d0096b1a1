//! Multi-part upload integration tests

mod common;

use common::{is_ad_identifier, part_number_of, MockBackend, MockTransport};
use signage_uploader::{
    PartStatus, ProgressAggregator, SessionState, UploadError, UploadOptions, UploadSource,
    UploadStrategy, Uploader, UploaderConfig, DEFAULT_PART_SIZE,
};
use std::sync::{Arc, Mutex};

const LARGE_FILE: usize = 120_000_000;

fn config() -> UploaderConfig {
    UploaderConfig::new("https://api.signage.test")
}

/// Small parts so the slow paths stay fast
fn small_config() -> UploaderConfig {
    config().part_size(1000).multipart_threshold(2000)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multipart_upload_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();

    let backend = MockBackend::new();
    let transport = MockTransport::new();
    let uploader = Uploader::new(config(), backend.clone(), transport.clone());

    let percents = Arc::new(Mutex::new(Vec::new()));
    let percents_clone = percents.clone();
    let options = UploadOptions::new().on_progress(move |snapshot| {
        percents_clone.lock().unwrap().push(snapshot.percent);
    });

    let result = uploader
        .upload_bytes("trailer.mp4", vec![7u8; LARGE_FILE], options)
        .await?;

    assert_eq!(result.strategy, UploadStrategy::MultiPart);
    assert_eq!(result.parts, Some(23));
    assert!(is_ad_identifier(&result.file_identifier, ".mp4"));

    let puts = transport.puts();
    assert_eq!(puts.len(), 23);
    for (index, (url, len)) in puts.iter().enumerate() {
        assert_eq!(part_number_of(url), Some(index as u32 + 1));
        if index < 22 {
            assert_eq!(*len as u64, DEFAULT_PART_SIZE);
        }
    }
    assert_eq!(puts[22].1, 4_656_640);
    assert_eq!(
        puts.iter().map(|(_, len)| *len).sum::<usize>(),
        LARGE_FILE
    );

    let calls = backend.calls();
    assert_eq!(calls.created.len(), 1);
    assert_eq!(calls.created[0].1, "video/mp4");
    assert_eq!(calls.part_urls.len(), 1);
    assert_eq!(calls.part_urls[0].2, 23);
    assert!(calls.single_shot.is_empty());

    assert_eq!(calls.finalized.len(), 1);
    let (file_name, token, parts) = &calls.finalized[0];
    assert_eq!(file_name, &result.file_identifier);
    assert_eq!(token, &format!("token-{}", result.file_identifier));
    let tags: Vec<String> = parts.iter().map(|p| p.completion_tag.clone()).collect();
    let expected: Vec<String> = (1..=23).map(|n| format!("T{}", n)).collect();
    assert_eq!(tags, expected);

    let percents = percents.lock().unwrap();
    assert_eq!(percents.len(), 23);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multipart_part_failure_stops_session() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();

    let backend = MockBackend::new();
    let transport = MockTransport {
        fail_on_call: Some(5),
        ..MockTransport::new()
    };
    let uploader = Uploader::new(config(), backend.clone(), transport.clone());
    let source = UploadSource::from_bytes("trailer.mp4", vec![0u8; LARGE_FILE]);
    let options = UploadOptions::new();

    let mut session = uploader.upload_init(&source, &options).await?;
    uploader
        .upload_acquire_urls(&mut session, &source, &options)
        .await?;
    assert_eq!(session.state, SessionState::UrlsAcquired);

    let progress = Arc::new(ProgressAggregator::new(session.size_bytes));
    let err = uploader
        .upload_transfer(&mut session, &source, &progress, &options)
        .await
        .unwrap_err();

    match err {
        UploadError::PartUploadFailed {
            part_number,
            status,
            ..
        } => {
            assert_eq!(part_number, 5);
            assert_eq!(status, Some(503));
        }
        other => panic!("Expected PartUploadFailed, got: {:?}", other),
    }

    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(transport.puts().len(), 5);
    assert_eq!(session.parts_done(), 4);
    assert_eq!(session.parts[4].status, PartStatus::Failed);
    assert!(session.parts[5..]
        .iter()
        .all(|p| p.status == PartStatus::Pending));
    assert!(progress.is_halted());
    assert_eq!(progress.bytes_acked(), 4 * DEFAULT_PART_SIZE);

    let err = uploader
        .upload_finalize(&mut session, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidState { .. }));
    assert!(backend.calls().finalized.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_parts_finalize_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();

    let backend = MockBackend::new();
    let transport = MockTransport {
        stagger: true,
        ..MockTransport::new()
    };
    let uploader = Uploader::new(small_config(), backend.clone(), transport.clone());

    let result = uploader
        .upload_bytes(
            "loop.webm",
            vec![3u8; 9_500],
            UploadOptions::new().concurrency(4),
        )
        .await?;
    assert_eq!(result.parts, Some(10));

    let completion_order: Vec<u32> = transport
        .puts()
        .iter()
        .filter_map(|(url, _)| part_number_of(url))
        .collect();
    assert_eq!(completion_order.len(), 10);
    assert_ne!(completion_order, (1..=10).collect::<Vec<_>>());

    let calls = backend.calls();
    let numbers: Vec<u32> = calls.finalized[0].2.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    for part in &calls.finalized[0].2 {
        assert_eq!(part.completion_tag, format!("T{}", part.part_number));
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_part_url_fails_before_transfer() {
    let backend = MockBackend {
        missing_part_url: true,
        ..MockBackend::new()
    };
    let transport = MockTransport::new();
    let uploader = Uploader::new(small_config(), backend, transport.clone());
    let source = UploadSource::from_bytes("menu.png", vec![0u8; 5_000]);
    let options = UploadOptions::new();

    let mut session = uploader.upload_init(&source, &options).await.unwrap();
    let err = uploader
        .upload_acquire_urls(&mut session, &source, &options)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::SessionCreateFailed { .. }));
    assert_eq!(session.state, SessionState::Failed);
    assert!(transport.puts().is_empty());
}

#[tokio::test]
async fn test_session_create_failure() {
    let backend = MockBackend {
        fail_create: true,
        ..MockBackend::new()
    };
    let transport = MockTransport::new();
    let uploader = Uploader::new(small_config(), backend.clone(), transport.clone());

    let err = uploader
        .upload_bytes("menu.png", vec![0u8; 5_000], UploadOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::SessionCreateFailed { .. }));
    assert!(err.to_string().contains("500"));
    assert!(backend.calls().part_urls.is_empty());
    assert!(transport.puts().is_empty());
}

#[tokio::test]
async fn test_finalize_failure_marks_session_failed() {
    let backend = MockBackend {
        fail_finalize: true,
        ..MockBackend::new()
    };
    let uploader = Uploader::new(small_config(), backend.clone(), MockTransport::new());
    let source = UploadSource::from_bytes("menu.png", vec![0u8; 5_000]);
    let options = UploadOptions::new();

    let mut session = uploader.upload_init(&source, &options).await.unwrap();
    uploader
        .upload_acquire_urls(&mut session, &source, &options)
        .await
        .unwrap();
    let progress = Arc::new(ProgressAggregator::new(session.size_bytes));
    uploader
        .upload_transfer(&mut session, &source, &progress, &options)
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::Uploading);
    assert_eq!(session.parts_done(), 5);

    let err = uploader
        .upload_finalize(&mut session, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::FinalizeFailed { .. }));
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(backend.calls().finalized.len(), 1);
}

#[tokio::test]
async fn test_record_update_failure_after_upload() {
    let backend = MockBackend {
        fail_notify: true,
        ..MockBackend::new()
    };
    let uploader = Uploader::new(small_config(), backend.clone(), MockTransport::new());

    let err = uploader
        .upload_bytes(
            "menu.png",
            vec![0u8; 5_000],
            UploadOptions::new().record_id("42"),
        )
        .await
        .unwrap_err();

    match err {
        UploadError::RecordUpdateFailed { record_id, .. } => assert_eq!(record_id, "42"),
        other => panic!("Expected RecordUpdateFailed, got: {:?}", other),
    }

    // The file itself was stored before the record update was attempted.
    let calls = backend.calls();
    assert_eq!(calls.finalized.len(), 1);
    assert_eq!(calls.notified.len(), 1);
    assert!(calls.notified[0].1.is_multipart_upload);
}

#[tokio::test]
async fn test_steps_out_of_order_rejected() {
    let uploader = Uploader::new(small_config(), MockBackend::new(), MockTransport::new());
    let source = UploadSource::from_bytes("menu.png", vec![0u8; 5_000]);
    let options = UploadOptions::new();

    let mut session = uploader.upload_init(&source, &options).await.unwrap();
    let progress = Arc::new(ProgressAggregator::new(session.size_bytes));

    let err = uploader
        .upload_transfer(&mut session, &source, &progress, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidState { .. }));
    assert_eq!(session.state, SessionState::Created);
}
