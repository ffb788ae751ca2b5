//! Fake media platform for testing
//!
//! Scripted enumeration results, injectable capture failures, a settable
//! microphone signal and permission/device-change events. Also usable by
//! embedders that want to drive the dialog without real hardware.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::errors::MediaError;
use crate::model::{DeviceDescriptor, DeviceKind, PermissionName, PermissionState};
use crate::platform::{
    AudioSink, MediaConstraints, MediaPlatform, MediaStream, MediaTrack, PlatformCapabilities,
    TrackConstraint, TrackKind, VideoSink,
};
use crate::tone::ToneGraph;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Two microphones, one speaker and one camera; labels optional
pub fn sample_devices(labeled: bool) -> Vec<DeviceDescriptor> {
    let label = |text: &str| if labeled { text.to_string() } else { String::new() };
    vec![
        DeviceDescriptor::new("mic-1", DeviceKind::AudioInput, label("Built-in Microphone"), "g1"),
        DeviceDescriptor::new("mic-2", DeviceKind::AudioInput, label("USB Headset"), "g2"),
        DeviceDescriptor::new("spk-1", DeviceKind::AudioOutput, label("Built-in Speakers"), "g1"),
        DeviceDescriptor::new("cam-1", DeviceKind::VideoInput, label("FaceTime HD Camera"), "g3"),
    ]
}

// ============================================================================
// Streams
// ============================================================================

/// Fake capture track
pub struct FakeTrack {
    kind: TrackKind,
    device_id: String,
    live: AtomicBool,
}

impl FakeTrack {
    fn new(kind: TrackKind, device_id: String) -> Self {
        Self {
            kind,
            device_id,
            live: AtomicBool::new(true),
        }
    }
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Fake capture stream reading from the platform's shared input signal
pub struct FakeStream {
    id: String,
    tracks: Vec<Arc<FakeTrack>>,
    signal: Arc<Mutex<Vec<f32>>>,
    reads: AtomicUsize,
}

impl FakeStream {
    /// Number of time-domain reads that returned samples
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }

    fn read_time_domain(&self, out: &mut [f32]) -> usize {
        let audio_live = self
            .tracks
            .iter()
            .any(|t| t.kind == TrackKind::Audio && t.is_live());
        if !audio_live {
            return 0;
        }
        let signal = lock(&self.signal);
        let n = signal.len().min(out.len());
        let offset = out.len() - n;
        out[offset..].copy_from_slice(&signal[signal.len() - n..]);
        self.reads.fetch_add(1, Ordering::SeqCst);
        n
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Scripted [`MediaPlatform`]
pub struct FakePlatform {
    capabilities: Mutex<PlatformCapabilities>,
    devices: Mutex<Vec<DeviceDescriptor>>,
    enumeration_script: Mutex<VecDeque<Result<Vec<DeviceDescriptor>, MediaError>>>,
    user_media_failures: Mutex<VecDeque<MediaError>>,
    user_media_delay: Mutex<Option<Duration>>,
    microphone: watch::Sender<PermissionState>,
    camera: watch::Sender<PermissionState>,
    failing_queries: Mutex<Vec<PermissionName>>,
    query_delay: Mutex<Option<Duration>>,
    device_changes: broadcast::Sender<()>,
    signal: Arc<Mutex<Vec<f32>>>,
    streams: Mutex<Vec<Arc<FakeStream>>>,
    requests: Mutex<Vec<MediaConstraints>>,
    enumerate_calls: AtomicUsize,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::with_capabilities(PlatformCapabilities::full())
    }

    pub fn with_capabilities(capabilities: PlatformCapabilities) -> Self {
        Self {
            capabilities: Mutex::new(capabilities),
            devices: Mutex::new(Vec::new()),
            enumeration_script: Mutex::new(VecDeque::new()),
            user_media_failures: Mutex::new(VecDeque::new()),
            user_media_delay: Mutex::new(None),
            microphone: watch::channel(PermissionState::Prompt).0,
            camera: watch::channel(PermissionState::Prompt).0,
            failing_queries: Mutex::new(Vec::new()),
            query_delay: Mutex::new(None),
            device_changes: broadcast::channel(16).0,
            signal: Arc::new(Mutex::new(Vec::new())),
            streams: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            enumerate_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_capabilities(&self, capabilities: PlatformCapabilities) {
        *lock(&self.capabilities) = capabilities;
    }

    /// Devices returned once the enumeration script is exhausted
    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *lock(&self.devices) = devices;
    }

    /// Queue the result of the next unscripted enumeration
    pub fn script_enumeration(&self, result: Result<Vec<DeviceDescriptor>, MediaError>) {
        lock(&self.enumeration_script).push_back(result);
    }

    /// Make the next capture request fail
    pub fn fail_next_user_media(&self, error: MediaError) {
        lock(&self.user_media_failures).push_back(error);
    }

    pub fn set_user_media_delay(&self, delay: Option<Duration>) {
        *lock(&self.user_media_delay) = delay;
    }

    pub fn set_permission(&self, name: PermissionName, state: PermissionState) {
        self.permission_sender(name).send_replace(state);
    }

    /// Delay every permission query answer
    pub fn set_permission_query_delay(&self, delay: Option<Duration>) {
        *lock(&self.query_delay) = delay;
    }

    pub fn fail_permission_query(&self, name: PermissionName) {
        lock(&self.failing_queries).push(name);
    }

    /// Simulate a device being plugged in or removed
    pub fn emit_device_change(&self) {
        let _ = self.device_changes.send(());
    }

    /// Microphone samples every live audio stream reads
    pub fn set_input_signal(&self, samples: Vec<f32>) {
        *lock(&self.signal) = samples;
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn user_media_calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<MediaConstraints> {
        lock(&self.requests).clone()
    }

    /// Every stream handed out so far
    pub fn streams(&self) -> Vec<Arc<FakeStream>> {
        lock(&self.streams).clone()
    }

    pub fn live_stream_count(&self) -> usize {
        lock(&self.streams)
            .iter()
            .filter(|s| s.is_active())
            .count()
    }

    fn permission_sender(&self, name: PermissionName) -> &watch::Sender<PermissionState> {
        match name {
            PermissionName::Microphone => &self.microphone,
            PermissionName::Camera => &self.camera,
        }
    }

    fn resolve_device(&self, kind: DeviceKind, constraint: &TrackConstraint) -> Result<String, MediaError> {
        let devices = lock(&self.devices);
        match constraint {
            TrackConstraint::Exact(id) => {
                if devices.iter().any(|d| d.kind == kind && &d.device_id == id) {
                    Ok(id.clone())
                } else {
                    Err(MediaError::overconstrained(format!("No {} with id {}", kind, id)))
                }
            }
            _ => Ok(devices
                .iter()
                .find(|d| d.kind == kind)
                .map(|d| d.device_id.clone())
                .unwrap_or_else(|| "default".to_string())),
        }
    }
}

#[async_trait]
impl MediaPlatform for FakePlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        *lock(&self.capabilities)
    }

    async fn query_permission(
        &self,
        name: PermissionName,
    ) -> Result<watch::Receiver<PermissionState>, MediaError> {
        let delay = *lock(&self.query_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failing_queries).contains(&name) {
            return Err(MediaError::new("TypeError", "Permission name not supported"));
        }
        Ok(self.permission_sender(name).subscribe())
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, MediaError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.enumeration_script).pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(lock(&self.devices).clone()),
        }
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        lock(&self.requests).push(constraints.clone());

        let delay = *lock(&self.user_media_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = lock(&self.user_media_failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        if constraints.is_empty() {
            return Err(MediaError::new(
                "TypeError",
                "At least one of audio and video must be requested",
            ));
        }

        let mut tracks = Vec::new();
        if constraints.audio.is_enabled() {
            let device = self.resolve_device(DeviceKind::AudioInput, &constraints.audio)?;
            tracks.push(Arc::new(FakeTrack::new(TrackKind::Audio, device)));
        }
        if constraints.video.is_enabled() {
            let device = self.resolve_device(DeviceKind::VideoInput, &constraints.video)?;
            tracks.push(Arc::new(FakeTrack::new(TrackKind::Video, device)));
        }

        // a successful capture implies the user granted access
        if constraints.audio.is_enabled() {
            self.microphone.send_replace(PermissionState::Granted);
        }
        if constraints.video.is_enabled() {
            self.camera.send_replace(PermissionState::Granted);
        }

        let stream = Arc::new(FakeStream {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
            signal: Arc::clone(&self.signal),
            reads: AtomicUsize::new(0),
        });
        lock(&self.streams).push(Arc::clone(&stream));
        Ok(stream)
    }

    fn subscribe_device_changes(&self) -> Option<broadcast::Receiver<()>> {
        if !self.capabilities().device_change_events {
            return None;
        }
        Some(self.device_changes.subscribe())
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Fake `<video>` element
#[derive(Default)]
pub struct FakeVideoSink {
    source: Mutex<Option<Arc<dyn MediaStream>>>,
    playing: AtomicBool,
    play_error: Mutex<Option<MediaError>>,
}

impl FakeVideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_play(&self, error: MediaError) {
        *lock(&self.play_error) = Some(error);
    }

    pub fn has_source(&self) -> bool {
        lock(&self.source).is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSink for FakeVideoSink {
    fn set_source(&self, stream: Option<Arc<dyn MediaStream>>) {
        *lock(&self.source) = stream;
    }

    async fn play(&self) -> Result<(), MediaError> {
        if let Some(error) = lock(&self.play_error).clone() {
            return Err(error);
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Fake `<audio>` element
#[derive(Default)]
pub struct FakeAudioSink {
    source: Mutex<Option<Arc<ToneGraph>>>,
    sink_id: Mutex<Option<String>>,
    playing: AtomicBool,
    sink_id_error: Mutex<Option<MediaError>>,
    play_error: Mutex<Option<MediaError>>,
    play_delay: Mutex<Option<Duration>>,
    play_calls: AtomicUsize,
}

impl FakeAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_set_sink_id(&self, error: MediaError) {
        *lock(&self.sink_id_error) = Some(error);
    }

    pub fn fail_play(&self, error: MediaError) {
        *lock(&self.play_error) = Some(error);
    }

    /// Hold `play()` pending for a while, like a slow output start
    pub fn set_play_delay(&self, delay: Option<Duration>) {
        *lock(&self.play_delay) = delay;
    }

    pub fn source(&self) -> Option<Arc<ToneGraph>> {
        lock(&self.source).clone()
    }

    pub fn sink_id(&self) -> Option<String> {
        lock(&self.sink_id).clone()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for FakeAudioSink {
    fn set_source(&self, tone: Option<Arc<ToneGraph>>) {
        *lock(&self.source) = tone;
    }

    async fn set_sink_id(&self, device_id: &str) -> Result<(), MediaError> {
        if let Some(error) = lock(&self.sink_id_error).clone() {
            return Err(error);
        }
        *lock(&self.sink_id) = Some(device_id.to_string());
        Ok(())
    }

    async fn play(&self) -> Result<(), MediaError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.play_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.play_error).clone() {
            return Err(error);
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}
