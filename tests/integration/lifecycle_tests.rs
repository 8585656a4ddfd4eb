//! Lifecycle and error handling tests.
//!
//! Verifies construction failures, disposal, wrong-thread calls and decode
//! failures.

use super::test_utils::{open_logged, open_mock, Gate, MockDecoder, MockSource, UnreadableSource};
use std::time::Duration;

use region_tiles::{MisuseError, Rect, TileError, TileProvider};

const WHOLE: Rect = Rect::from_size(400, 300);

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_unreadable_source_fails_construction() {
    let result = TileProvider::open(UnreadableSource, |_| {}).await;
    match result {
        Err(TileError::Construction { reason }) => assert!(reason.contains("unsupported")),
        other => panic!("Expected construction error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_image_fails_construction() {
    let result = TileProvider::open(MockSource::new(MockDecoder::new(640, 0)), |_| {}).await;
    assert!(matches!(result, Err(TileError::Construction { .. })));
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test]
async fn test_dispose_releases_everything() {
    let (mut provider, probe) = open_mock(400, 300).await;
    provider.request_tiles(1.0, 100, 100, WHOLE).unwrap();
    provider.settle().await.unwrap();
    assert!(provider.stats().resident_bytes > 0);

    provider.dispose().unwrap();

    assert!(provider.is_disposed());
    assert_eq!(provider.stats().resident_bytes, 0);
    assert_eq!(provider.stats().levels, 0);
    assert!(provider.visible_tiles().is_empty());
    assert!(probe.wait_dropped().await);
}

#[tokio::test]
async fn test_calls_after_dispose() {
    let (mut provider, _) = open_mock(400, 300).await;
    provider.dispose().unwrap();

    assert!(provider.request_tiles(1.0, 100, 100, WHOLE).unwrap().is_empty());
    assert_eq!(provider.stats().tiles, 0);

    for result in [
        provider.poll_completions().map(|_| ()),
        provider.settle().await,
        provider.next_completion().await.map(|_| ()),
        provider.set_preferred_pixel_format(None),
        provider.dispose(),
    ] {
        match result {
            Err(e @ TileError::Misuse(MisuseError::Disposed)) => assert!(e.is_misuse()),
            other => panic!("Expected Disposed, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_in_flight_decodes_never_land_after_dispose() {
    let gate = Gate::new();
    let decoder = MockDecoder::new(400, 300).gated(gate.clone());
    let probe = decoder.probe();
    let (mut provider, log) = open_logged(MockSource::new(decoder)).await;

    provider.request_tiles(1.0, 100, 100, WHOLE).unwrap();
    provider.dispose().unwrap();
    assert_eq!(provider.stats().in_flight, 0);

    gate.open();
    assert!(probe.wait_dropped().await);

    assert_eq!(provider.stats().available, 0);
    assert_eq!(log.count(), 0);
}

#[tokio::test]
async fn test_drop_without_dispose_releases_decoder() {
    let (mut provider, probe) = open_mock(400, 300).await;
    provider.request_tiles(1.0, 100, 100, Rect::new(0, 0, 100, 100)).unwrap();
    provider.settle().await.unwrap();

    drop(provider);
    assert!(probe.wait_dropped().await);
}

// =============================================================================
// Coordination Thread
// =============================================================================

#[tokio::test]
async fn test_other_thread_is_rejected() {
    let (mut provider, probe) = open_mock(400, 300).await;

    let (request, dispose) = std::thread::scope(|s| {
        s.spawn(|| {
            let request = provider.request_tiles(1.0, 100, 100, WHOLE).map(|v| v.len());
            let dispose = provider.dispose();
            (request, dispose)
        })
        .join()
        .unwrap()
    });

    assert!(matches!(
        request,
        Err(TileError::Misuse(MisuseError::WrongContext))
    ));
    assert!(matches!(
        dispose,
        Err(TileError::Misuse(MisuseError::WrongContext))
    ));

    // Still usable from the owning thread
    assert!(!provider.is_disposed());
    provider.request_tiles(1.0, 100, 100, WHOLE).unwrap();
    provider.settle().await.unwrap();
    assert_eq!(probe.calls(), 12);
}

// =============================================================================
// Decode Failures
// =============================================================================

#[tokio::test]
async fn test_decode_failure_surfaces_as_error() {
    let decoder = MockDecoder::new(400, 300).failing();
    let (mut provider, log) = open_logged(MockSource::new(decoder)).await;

    provider.request_tiles(1.0, 100, 100, Rect::new(0, 0, 100, 100)).unwrap();
    let err = provider.settle().await.unwrap_err();

    match &err {
        TileError::DecodeFailure {
            level,
            rect,
            message,
        } => {
            assert_eq!(*level, 1);
            assert_eq!(*rect, Rect::new(0, 0, 100, 100));
            assert_eq!(message, "corrupt scan line");
        }
        other => panic!("Expected DecodeFailure, got {:?}", other),
    }
    assert!(!err.is_misuse());
    assert!(err.to_string().contains("corrupt scan line"));

    // The tile is left empty and nothing was published
    assert_eq!(provider.stats().loading, 0);
    assert_eq!(provider.stats().available, 0);
    assert_eq!(log.count(), 0);
}

#[tokio::test]
async fn test_failure_of_evicted_level_is_still_reported() {
    let gate = Gate::new();
    let decoder = MockDecoder::new(400, 300)
        .gated(gate.clone())
        .failing()
        .only_at_level(1);
    let (mut provider, _) = open_logged(MockSource::new(decoder)).await;

    // Level 1 decodes block; level 8 completes and then evicts level 1
    provider.request_tiles(1.0, 100, 100, WHOLE).unwrap();
    provider.request_tiles(0.1, 100, 100, WHOLE).unwrap();
    while provider.stats().available == 0 {
        provider.next_completion().await.unwrap();
    }
    provider.request_tiles(0.1, 100, 100, WHOLE).unwrap();
    assert_eq!(provider.cache().levels(), vec![8]);

    gate.open();
    let mut failures = 0;
    loop {
        match provider.next_completion().await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(TileError::DecodeFailure { level, message, .. }) => {
                assert_eq!(level, 1);
                assert_eq!(message, "corrupt scan line");
                failures += 1;
            }
            Err(other) => panic!("Expected DecodeFailure, got {:?}", other),
        }
    }

    // Workers that started before the zoom decoded and failed; later ones
    // saw the newer request and skipped
    assert!(failures <= 12);
    assert_eq!(provider.stats().in_flight, 0);
    assert_eq!(provider.cache().levels(), vec![8]);
}

#[tokio::test]
async fn test_failure_of_evicted_level_reaches_settle() {
    let gate = Gate::new();
    let decoder = MockDecoder::new(400, 300)
        .gated(gate.clone())
        .failing()
        .only_at_level(1);
    let probe = decoder.probe();
    let (mut provider, _) = open_logged(MockSource::new(decoder)).await;

    provider.request_tiles(1.0, 100, 100, Rect::new(0, 0, 100, 100)).unwrap();
    // Wait until the level 1 worker is inside the decoder
    while probe.calls() == 0 {
        tokio::task::yield_now().await;
    }

    provider.request_tiles(0.1, 100, 100, WHOLE).unwrap();
    while provider.stats().available == 0 {
        provider.next_completion().await.unwrap();
    }
    provider.request_tiles(0.1, 100, 100, WHOLE).unwrap();
    assert_eq!(provider.cache().levels(), vec![8]);

    gate.open();
    match provider.settle().await {
        Err(TileError::DecodeFailure { level, rect, .. }) => {
            assert_eq!(level, 1);
            assert_eq!(rect, Rect::new(0, 0, 100, 100));
        }
        other => panic!("Expected DecodeFailure, got {:?}", other),
    }
    assert_eq!(provider.stats().in_flight, 0);
}

#[tokio::test]
async fn test_panicking_decoder_does_not_hang_settle() {
    let decoder = MockDecoder::new(400, 300).panicking();
    let (mut provider, log) = open_logged(MockSource::new(decoder)).await;
    let viewport = Rect::new(0, 0, 100, 100);

    provider.request_tiles(1.0, 100, 100, viewport).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), provider.settle())
        .await
        .expect("settle must not hang on a panicking decoder");

    match result {
        Err(TileError::DecodeFailure { message, .. }) => {
            assert!(message.contains("scan line table out of range"));
        }
        other => panic!("Expected DecodeFailure, got {:?}", other),
    }

    let stats = provider.stats();
    assert_eq!(stats.loading, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(log.count(), 0);

    // The tile is back to empty and is dispatched again
    provider.request_tiles(1.0, 100, 100, viewport).unwrap();
    assert_eq!(provider.stats().in_flight, 1);
}
