// Shared fixtures for device checker integration tests
#![allow(dead_code)]

use device_checker_lib::dialog::{DeviceCheckerDialog, DialogEvent, DialogSinks};
use device_checker_lib::fake_platform::{FakeAudioSink, FakePlatform, FakeVideoSink};
use device_checker_lib::media_devices::DeviceSessionManager;
use device_checker_lib::platform::{AudioSink, MediaPlatform, VideoSink};
use device_checker_lib::settings::CheckerSettings;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Manager over a fake platform with default settings
pub fn manager_for(platform: &Arc<FakePlatform>) -> Arc<DeviceSessionManager> {
    let platform: Arc<dyn MediaPlatform> = platform.clone();
    DeviceSessionManager::new(platform, CheckerSettings::default())
}

pub struct DialogFixture {
    pub platform: Arc<FakePlatform>,
    pub video: Arc<FakeVideoSink>,
    pub audio: Arc<FakeAudioSink>,
    pub dialog: DeviceCheckerDialog,
    pub events: mpsc::UnboundedReceiver<DialogEvent>,
}

/// Dialog with both sinks attached
pub fn dialog_fixture(platform: Arc<FakePlatform>) -> DialogFixture {
    let video = Arc::new(FakeVideoSink::new());
    let audio = Arc::new(FakeAudioSink::new());
    let sinks = DialogSinks {
        video: Some(Arc::clone(&video) as Arc<dyn VideoSink>),
        audio: Some(Arc::clone(&audio) as Arc<dyn AudioSink>),
    };
    let (dialog, events) = DeviceCheckerDialog::new(manager_for(&platform), sinks);
    DialogFixture {
        platform,
        video,
        audio,
        dialog,
        events,
    }
}

/// Full-scale square wave; peak level 1.0
pub fn loud_signal() -> Vec<f32> {
    (0..256).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect()
}

/// Let spawned tasks observe pending events
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Collect every event sent so far
pub fn drain(events: &mut mpsc::UnboundedReceiver<DialogEvent>) -> Vec<DialogEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
