// Device session manager integration tests
// Lifecycle of microphone, camera and speaker tests over the fake platform

mod helpers;

use device_checker_lib::errors::{MediaError, INSECURE_CONTEXT_MESSAGE, LABELS_PENDING_MESSAGE};
use device_checker_lib::fake_platform::{sample_devices, FakeAudioSink, FakePlatform, FakeVideoSink};
use device_checker_lib::model::{Label, PermissionName, PermissionState};
use device_checker_lib::platform::{
    AudioSink, MediaConstraints, MediaStream, PlatformCapabilities, TrackConstraint, VideoSink,
};
use helpers::{loud_signal, manager_for, settle};
use std::sync::Arc;
use std::time::Duration;

fn platform_with_devices() -> Arc<FakePlatform> {
    let platform = Arc::new(FakePlatform::new());
    platform.set_devices(sample_devices(true));
    platform
}

fn video_sink() -> (Arc<FakeVideoSink>, Arc<dyn VideoSink>) {
    let sink = Arc::new(FakeVideoSink::new());
    let dyn_sink: Arc<dyn VideoSink> = sink.clone();
    (sink, dyn_sink)
}

fn audio_sink() -> (Arc<FakeAudioSink>, Arc<dyn AudioSink>) {
    let sink = Arc::new(FakeAudioSink::new());
    let dyn_sink: Arc<dyn AudioSink> = sink.clone();
    (sink, dyn_sink)
}

// ============================================================================
// Enumeration
// ============================================================================

/// GIVEN: two microphones, one speaker and one camera with labels
/// WHEN: refresh_devices() runs
/// THEN: the catalog is partitioned by kind in enumeration order
#[tokio::test]
async fn test_refresh_partitions_catalog() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    manager.refresh_devices().await;

    let devices = manager.devices();
    assert_eq!(devices.audio_inputs.len(), 2);
    assert_eq!(devices.audio_outputs.len(), 1);
    assert_eq!(devices.video_inputs.len(), 1);
    assert_eq!(devices.audio_inputs[0].device_id, "mic-1");
    assert_eq!(devices.audio_inputs[1].device_id, "mic-2");
    assert_eq!(manager.error(), None);
}

/// GIVEN: devices are present but none has a label
/// WHEN: refresh_devices() runs
/// THEN: the catalog is published and the labels-pending message is set
#[tokio::test]
async fn test_unlabeled_enumeration_keeps_labels_pending() {
    let platform = Arc::new(FakePlatform::new());
    platform.script_enumeration(Ok(sample_devices(false)));
    platform.set_devices(sample_devices(true));
    let manager = manager_for(&platform);

    manager.refresh_devices().await;
    assert_eq!(manager.devices().len(), 4);
    assert_eq!(manager.error().as_deref(), Some(LABELS_PENDING_MESSAGE));

    // labels appear: error cleared
    manager.refresh_devices().await;
    assert_eq!(manager.error(), None);
}

#[tokio::test]
async fn test_empty_enumeration_is_not_labels_pending() {
    let platform = Arc::new(FakePlatform::new());
    let manager = manager_for(&platform);

    manager.refresh_devices().await;
    assert!(manager.devices().is_empty());
    assert_eq!(manager.error(), None);
}

#[tokio::test]
async fn test_enumeration_failure_sets_classified_message() {
    let platform = Arc::new(FakePlatform::new());
    platform.script_enumeration(Err(MediaError::not_allowed("blocked")));
    let manager = manager_for(&platform);

    manager.refresh_devices().await;
    assert_eq!(
        manager.error(),
        Some(MediaError::not_allowed("").user_message())
    );
}

#[tokio::test]
async fn test_refresh_fails_fast_without_platform() {
    let platform = Arc::new(FakePlatform::with_capabilities(PlatformCapabilities::unavailable()));
    let manager = manager_for(&platform);

    manager.refresh_devices().await;
    assert_eq!(manager.error().as_deref(), Some(Label::BrowserNotSupported.text()));
    assert_eq!(platform.enumerate_calls(), 0);
}

#[tokio::test]
async fn test_refresh_fails_fast_in_insecure_context() {
    let mut caps = PlatformCapabilities::full();
    caps.secure_context = false;
    let platform = Arc::new(FakePlatform::with_capabilities(caps));
    let manager = manager_for(&platform);

    manager.refresh_devices().await;
    assert_eq!(manager.error().as_deref(), Some(INSECURE_CONTEXT_MESSAGE));
    assert_eq!(platform.enumerate_calls(), 0);
}

/// GIVEN: the platform emits device-change notifications
/// WHEN: a device is plugged in
/// THEN: the manager re-enumerates on its own
#[tokio::test]
async fn test_device_change_triggers_refresh() {
    let platform = Arc::new(FakePlatform::new());
    let manager = manager_for(&platform);
    manager.refresh_devices().await;
    assert!(manager.devices().is_empty());

    platform.set_devices(sample_devices(true));
    platform.emit_device_change();
    settle().await;

    assert_eq!(manager.devices().len(), 4);
    assert_eq!(platform.enumerate_calls(), 2);
}

#[tokio::test]
async fn test_device_subscribers_see_refreshed_catalog() {
    let platform = Arc::new(FakePlatform::new());
    let manager = manager_for(&platform);
    let mut devices = manager.subscribe_devices();
    assert!(devices.borrow_and_update().is_empty());

    platform.set_devices(sample_devices(true));
    platform.emit_device_change();

    tokio::time::timeout(Duration::from_secs(1), devices.changed())
        .await
        .expect("catalog published")
        .expect("manager alive");
    let catalog = devices.borrow_and_update().clone();
    assert_eq!(catalog.audio_inputs.len(), 2);
    assert_eq!(catalog.video_inputs[0].device_id, "cam-1");
}

/// GIVEN: a populated catalog
/// WHEN: the platform stops offering media and the catalog is refreshed
/// THEN: the refresh fails fast and the last catalog is kept
#[tokio::test]
async fn test_refresh_after_platform_loses_media() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    manager.refresh_devices().await;
    assert_eq!(manager.devices().len(), 4);

    platform.set_capabilities(PlatformCapabilities::unavailable());
    manager.refresh_devices().await;

    assert_eq!(manager.error().as_deref(), Some(Label::BrowserNotSupported.text()));
    assert_eq!(manager.devices().len(), 4);
    assert_eq!(platform.enumerate_calls(), 1);
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn test_check_permissions_reports_and_follows_changes() {
    let platform = Arc::new(FakePlatform::new());
    platform.set_permission(PermissionName::Microphone, PermissionState::Granted);
    let manager = manager_for(&platform);

    let status = manager.check_permissions().await.expect("status available");
    assert_eq!(status.microphone, PermissionState::Granted);
    assert_eq!(status.camera, PermissionState::Prompt);

    platform.set_permission(PermissionName::Camera, PermissionState::Denied);
    settle().await;

    let published = manager.permission_status().expect("status published");
    assert_eq!(published.camera, PermissionState::Denied);
    assert_eq!(published.microphone, PermissionState::Granted);
}

#[tokio::test]
async fn test_error_and_permission_subscribers_follow_changes() {
    let platform = Arc::new(FakePlatform::new());
    let manager = manager_for(&platform);
    let mut error = manager.subscribe_error();
    let mut permission = manager.subscribe_permission_status();

    platform.fail_next_user_media(MediaError::not_allowed("Permission denied"));
    assert!(!manager.ensure_permissions(true, false).await);
    assert!(error.has_changed().expect("manager alive"));
    assert_eq!(
        *error.borrow_and_update(),
        Some(MediaError::not_allowed("").user_message())
    );

    manager.check_permissions().await;
    assert!(permission.has_changed().expect("manager alive"));
    let status = (*permission.borrow_and_update()).expect("status published");
    assert_eq!(status.microphone, PermissionState::Prompt);

    platform.set_permission(PermissionName::Microphone, PermissionState::Granted);
    tokio::time::timeout(Duration::from_secs(1), permission.changed())
        .await
        .expect("permission change published")
        .expect("manager alive");
    let status = (*permission.borrow_and_update()).expect("status published");
    assert_eq!(status.microphone, PermissionState::Granted);
}

/// GIVEN: permission queries answer slowly
/// WHEN: cleanup_all() runs before they return
/// THEN: the late answers start no watchers
#[tokio::test(start_paused = true)]
async fn test_cleanup_during_permission_query_starts_no_watchers() {
    let platform = Arc::new(FakePlatform::new());
    platform.set_permission_query_delay(Some(Duration::from_millis(50)));
    let manager = manager_for(&platform);

    let (status, ()) = tokio::join!(manager.check_permissions(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.cleanup_all(None);
    });
    assert_eq!(status.expect("status available").camera, PermissionState::Prompt);

    platform.set_permission(PermissionName::Camera, PermissionState::Denied);
    settle().await;

    let published = manager.permission_status().expect("status published");
    assert_eq!(published.camera, PermissionState::Prompt);
}

#[tokio::test]
async fn test_failed_permission_query_counts_as_prompt() {
    let platform = Arc::new(FakePlatform::new());
    platform.set_permission(PermissionName::Camera, PermissionState::Granted);
    platform.fail_permission_query(PermissionName::Camera);
    let manager = manager_for(&platform);

    let status = manager.check_permissions().await.expect("status available");
    assert_eq!(status.camera, PermissionState::Prompt);
}

#[tokio::test]
async fn test_check_permissions_without_query_capability() {
    let mut caps = PlatformCapabilities::full();
    caps.permissions_query = false;
    let platform = Arc::new(FakePlatform::with_capabilities(caps));
    let manager = manager_for(&platform);

    assert_eq!(manager.check_permissions().await, None);
    assert_eq!(manager.permission_status(), None);
}

#[tokio::test]
async fn test_ensure_permissions_with_nothing_wanted() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    assert!(!manager.ensure_permissions(false, false).await);
    assert_eq!(platform.user_media_calls(), 0);
}

/// GIVEN: the user grants access
/// WHEN: ensure_permissions(true, true) runs
/// THEN: the permission stream is stopped at once and permission status refreshed
#[tokio::test]
async fn test_ensure_permissions_granted_releases_request_stream() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    assert!(manager.ensure_permissions(true, true).await);

    assert_eq!(platform.requests(), vec![MediaConstraints::permission_request(true, true)]);
    assert_eq!(platform.live_stream_count(), 0);
    assert_eq!(manager.error(), None);
    let status = manager.permission_status().expect("status refreshed after grant");
    assert_eq!(status.microphone, PermissionState::Granted);
    assert_eq!(status.camera, PermissionState::Granted);
}

#[tokio::test]
async fn test_ensure_permissions_denied() {
    let platform = platform_with_devices();
    platform.fail_next_user_media(MediaError::not_allowed("Permission denied"));
    let manager = manager_for(&platform);

    assert!(!manager.ensure_permissions(true, true).await);
    assert_eq!(
        manager.error().as_deref(),
        Some("🚫 Permission denied. Please allow access to your camera/microphone in browser settings.")
    );
    assert_eq!(platform.live_stream_count(), 0);
}

#[tokio::test]
async fn test_ensure_permissions_silent_without_platform() {
    let platform = Arc::new(FakePlatform::with_capabilities(PlatformCapabilities::unavailable()));
    let manager = manager_for(&platform);

    assert!(!manager.ensure_permissions(true, true).await);
    assert_eq!(manager.error(), None);
    assert_eq!(platform.user_media_calls(), 0);
}

// ============================================================================
// Microphone test
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_mic_level_published_from_first_frame() {
    let platform = platform_with_devices();
    platform.set_input_signal(loud_signal());
    let manager = manager_for(&platform);

    manager.start_mic_test(Some("mic-2")).await;
    assert!(manager.is_mic_testing());
    settle().await;

    // no clock advance needed for the first sample
    assert_eq!(manager.mic_level(), 1.0);
    assert_eq!(
        platform.requests()[0].audio,
        TrackConstraint::Exact("mic-2".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_mic_level_tracks_signal() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    manager.start_mic_test(None).await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(manager.mic_level(), 0.0);

    platform.set_input_signal(vec![0.25; 64]);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!((manager.mic_level() - 0.25).abs() < 0.01);
}

/// GIVEN: a running microphone test
/// WHEN: stop_mic_test() is called (twice)
/// THEN: tracks are stopped, level is 0 and sampling ceases
#[tokio::test(start_paused = true)]
async fn test_stop_mic_test_releases_everything() {
    let platform = platform_with_devices();
    platform.set_input_signal(loud_signal());
    let manager = manager_for(&platform);

    manager.start_mic_test(None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(manager.mic_level() > 0.0);

    manager.stop_mic_test();
    manager.stop_mic_test();

    assert!(!manager.is_mic_testing());
    assert_eq!(manager.mic_level(), 0.0);
    assert_eq!(platform.live_stream_count(), 0);

    let streams = platform.streams();
    let stream = &streams[0];
    let reads = stream.read_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stream.read_count(), reads);
    assert_eq!(manager.mic_level(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_previous_mic_stream() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    manager.start_mic_test(Some("mic-1")).await;
    manager.start_mic_test(Some("mic-2")).await;

    let streams = platform.streams();
    assert_eq!(streams.len(), 2);
    assert!(!streams[0].is_active());
    assert!(streams[1].is_active());
    assert_eq!(platform.live_stream_count(), 1);
    assert!(manager.is_mic_testing());
}

#[tokio::test]
async fn test_mic_failure_sets_error_and_stops() {
    let platform = platform_with_devices();
    platform.fail_next_user_media(MediaError::not_readable("Could not start audio source"));
    let manager = manager_for(&platform);

    manager.start_mic_test(None).await;

    assert!(!manager.is_mic_testing());
    assert_eq!(
        manager.error().as_deref(),
        Some("⚠️ Device is already in use by another application.")
    );
}

#[tokio::test]
async fn test_mic_unknown_device_is_overconstrained() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    manager.start_mic_test(Some("unplugged")).await;

    assert!(!manager.is_mic_testing());
    assert_eq!(
        manager.error().as_deref(),
        Some("⚠️ No device matches the requested constraints.")
    );
}

/// GIVEN: stream acquisition is slow
/// WHEN: the test is stopped before the stream arrives
/// THEN: the late stream is stopped and the test stays off
#[tokio::test(start_paused = true)]
async fn test_stale_mic_start_is_discarded() {
    let platform = platform_with_devices();
    platform.set_user_media_delay(Some(Duration::from_millis(50)));
    let manager = manager_for(&platform);

    tokio::join!(manager.start_mic_test(None), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.stop_mic_test();
    });

    assert!(!manager.is_mic_testing());
    assert_eq!(platform.streams().len(), 1);
    assert_eq!(platform.live_stream_count(), 0);
    assert_eq!(manager.mic_level(), 0.0);
}

/// GIVEN: a slow start that will fail
/// WHEN: a newer start replaces it and succeeds
/// THEN: the stale failure is not published over the running test
#[tokio::test(start_paused = true)]
async fn test_superseded_mic_failure_is_not_published() {
    let platform = platform_with_devices();
    platform.set_user_media_delay(Some(Duration::from_millis(50)));
    platform.fail_next_user_media(MediaError::not_allowed("Permission denied"));
    let manager = manager_for(&platform);

    tokio::join!(manager.start_mic_test(None), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.start_mic_test(Some("mic-2")).await;
    });

    assert_eq!(manager.error(), None);
    assert!(manager.is_mic_testing());
    assert_eq!(platform.live_stream_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mic_level_subscribers_see_level_then_reset() {
    let platform = platform_with_devices();
    platform.set_input_signal(loud_signal());
    let manager = manager_for(&platform);
    let mut level = manager.subscribe_mic_level();
    let mut testing = manager.subscribe_is_mic_testing();

    manager.start_mic_test(None).await;
    assert!(*testing.borrow_and_update());

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            level.changed().await.expect("manager alive");
            if *level.borrow_and_update() > 0.0 {
                break;
            }
        }
    })
    .await
    .expect("level published");

    manager.stop_mic_test();
    assert!(level.has_changed().expect("manager alive"));
    assert_eq!(*level.borrow_and_update(), 0.0);
    assert!(!*testing.borrow_and_update());
}

#[tokio::test]
async fn test_mic_start_is_noop_without_capture() {
    let mut caps = PlatformCapabilities::full();
    caps.user_media = false;
    let platform = Arc::new(FakePlatform::with_capabilities(caps));
    let manager = manager_for(&platform);

    manager.start_mic_test(None).await;
    assert!(!manager.is_mic_testing());
    assert_eq!(platform.user_media_calls(), 0);
    assert_eq!(manager.error(), None);
}

// ============================================================================
// Camera preview
// ============================================================================

#[tokio::test]
async fn test_video_start_and_stop() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = video_sink();

    manager.start_video(&dyn_sink, Some("cam-1")).await;
    assert!(manager.is_video_on());
    assert!(sink.has_source());
    assert!(sink.is_playing());
    assert_eq!(
        platform.requests()[0],
        MediaConstraints::video_only(Some("cam-1"))
    );

    manager.stop_video(Some(dyn_sink.as_ref()));
    assert!(!manager.is_video_on());
    assert!(!sink.has_source());
    assert!(!sink.is_playing());
    assert_eq!(platform.live_stream_count(), 0);
}

/// GIVEN: a slow camera start that will fail
/// WHEN: the preview is stopped before it resolves
/// THEN: no error is published and the preview stays off
#[tokio::test(start_paused = true)]
async fn test_stopped_video_failure_is_not_published() {
    let platform = platform_with_devices();
    platform.set_user_media_delay(Some(Duration::from_millis(50)));
    platform.fail_next_user_media(MediaError::not_found("Requested device not found"));
    let manager = manager_for(&platform);
    let (video, dyn_video) = video_sink();
    let mut video_on = manager.subscribe_is_video_on();

    tokio::join!(manager.start_video(&dyn_video, None), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.stop_video(Some(dyn_video.as_ref()));
    });

    assert_eq!(manager.error(), None);
    assert!(!*video_on.borrow_and_update());
    assert!(!video.has_source());
}

#[tokio::test]
async fn test_video_stop_when_not_started() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    manager.stop_video(None);
    assert!(!manager.is_video_on());
    assert_eq!(manager.error(), None);
}

#[tokio::test]
async fn test_video_playback_failure_releases_stream() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = video_sink();
    sink.fail_play(MediaError::abort("play() interrupted"));

    manager.start_video(&dyn_sink, None).await;

    assert!(!manager.is_video_on());
    assert!(!sink.has_source());
    assert_eq!(platform.live_stream_count(), 0);
    assert_eq!(manager.error().as_deref(), Some("play() interrupted"));
}

// ============================================================================
// Speaker test
// ============================================================================

/// GIVEN: output selection is supported
/// WHEN: the test tone plays on a chosen speaker
/// THEN: it is routed there and torn down after its duration
#[tokio::test(start_paused = true)]
async fn test_tone_routes_and_tears_down() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();

    manager.play_test_tone(&dyn_sink, Some("spk-1")).await;

    assert_eq!(sink.sink_id().as_deref(), Some("spk-1"));
    assert!(sink.is_playing());
    let graph = sink.source().expect("tone attached");
    assert!(graph.is_sounding());
    assert_eq!(graph.frequency_hz(), 440.0);
    assert!(manager.is_tone_playing());

    tokio::time::sleep(Duration::from_millis(799)).await;
    assert!(graph.is_sounding());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!sink.is_playing());
    assert!(sink.source().is_none());
    assert!(graph.is_closed());
    assert!(!manager.is_tone_playing());
}

#[tokio::test(start_paused = true)]
async fn test_tone_routing_failure_is_advisory() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();
    sink.fail_set_sink_id(MediaError::not_found("Requested device not found"));

    manager.play_test_tone(&dyn_sink, Some("spk-1")).await;

    assert!(sink.is_playing());
    assert_eq!(
        manager.error().as_deref(),
        Some(Label::OutputSwitchUnsupported.text())
    );
}

#[tokio::test(start_paused = true)]
async fn test_tone_skips_routing_without_output_selection() {
    let mut caps = PlatformCapabilities::full();
    caps.output_selection = false;
    let platform = Arc::new(FakePlatform::with_capabilities(caps));
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();

    manager.play_test_tone(&dyn_sink, Some("spk-1")).await;

    assert_eq!(sink.sink_id(), None);
    assert!(sink.is_playing());
}

#[tokio::test]
async fn test_tone_playback_failure_closes_graph() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();
    sink.fail_play(MediaError::not_allowed("play() requires a user gesture"));

    manager.play_test_tone(&dyn_sink, None).await;

    assert!(sink.source().is_none());
    assert!(!manager.is_tone_playing());
    assert_eq!(
        manager.error(),
        Some(MediaError::not_allowed("").user_message())
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_tone_ends_first() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();

    manager.play_test_tone(&dyn_sink, None).await;
    let first = sink.source().expect("first tone");
    tokio::time::sleep(Duration::from_millis(400)).await;

    manager.play_test_tone(&dyn_sink, None).await;
    let second = sink.source().expect("second tone");
    assert!(first.is_closed());
    assert!(second.is_sounding());

    // the first tone's timer must not end the second tone
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(second.is_sounding());
    assert!(sink.is_playing());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(second.is_closed());
}

/// GIVEN: the output is slow to start playing
/// WHEN: cleanup_all() runs while playback is pending
/// THEN: the late tone is discarded instead of sounding after teardown
#[tokio::test(start_paused = true)]
async fn test_cleanup_during_slow_tone_start_discards_tone() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();
    sink.set_play_delay(Some(Duration::from_millis(50)));

    let ((), graph) = tokio::join!(manager.play_test_tone(&dyn_sink, None), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let graph = sink.source().expect("tone attached before playback");
        manager.cleanup_all(None);
        graph
    });

    assert!(!manager.is_tone_playing());
    assert!(!sink.is_playing());
    assert!(sink.source().is_none());
    assert!(graph.is_closed());
    assert!(!graph.is_sounding());
    assert_eq!(sink.play_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_newer_tone_wins_over_slow_start() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (slow, dyn_slow) = audio_sink();
    slow.set_play_delay(Some(Duration::from_millis(50)));
    let (fast, dyn_fast) = audio_sink();

    tokio::join!(manager.play_test_tone(&dyn_slow, None), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.play_test_tone(&dyn_fast, None).await;
    });

    assert!(manager.is_tone_playing());
    assert!(fast.is_playing());
    assert!(!slow.is_playing());
    assert!(slow.source().is_none());
}

/// GIVEN: one sink that is slow to start playing
/// WHEN: a second tone starts on it before the first resolves
/// THEN: the first tone is closed and the second keeps the sink
#[tokio::test(start_paused = true)]
async fn test_slow_tone_restarted_on_same_sink() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);
    let (sink, dyn_sink) = audio_sink();
    sink.set_play_delay(Some(Duration::from_millis(50)));

    let ((), first) = tokio::join!(manager.play_test_tone(&dyn_sink, None), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = sink.source().expect("first tone attached");
        manager.play_test_tone(&dyn_sink, None).await;
        first
    });

    assert!(first.is_closed());
    assert!(manager.is_tone_playing());
    assert!(sink.is_playing());
    let second = sink.source().expect("second tone attached");
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_sounding());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cleanup_all_releases_everything_twice() {
    let platform = platform_with_devices();
    platform.set_input_signal(loud_signal());
    let manager = manager_for(&platform);
    let (video, dyn_video) = video_sink();
    let (audio, dyn_audio) = audio_sink();

    manager.start_mic_test(None).await;
    manager.start_video(&dyn_video, None).await;
    manager.play_test_tone(&dyn_audio, None).await;
    assert_eq!(platform.live_stream_count(), 2);

    manager.cleanup_all(Some(dyn_video.as_ref()));
    manager.cleanup_all(Some(dyn_video.as_ref()));

    assert!(!manager.is_mic_testing());
    assert!(!manager.is_video_on());
    assert!(!manager.is_tone_playing());
    assert_eq!(manager.mic_level(), 0.0);
    assert_eq!(platform.live_stream_count(), 0);
    assert!(!video.has_source());
    assert!(audio.source().is_none());
    assert!(!manager.is_monitoring_devices());

    // device changes are no longer observed
    let calls = platform.enumerate_calls();
    platform.emit_device_change();
    settle().await;
    assert_eq!(platform.enumerate_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_stops_streams() {
    let platform = platform_with_devices();
    let manager = manager_for(&platform);

    manager.start_mic_test(None).await;
    assert_eq!(platform.live_stream_count(), 1);

    drop(manager);
    assert_eq!(platform.live_stream_count(), 0);
}
