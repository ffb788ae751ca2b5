//! DeviceSessionManager - Media device sessions for the device checker
//!
//! Owns every platform stream the checker opens (microphone test, camera
//! preview, speaker test tone) and publishes observable state through
//! `watch` channels.
//!
//! ## Design
//!
//! - The platform is an injected [`MediaPlatform`]; the manager converts
//!   its capabilities, errors and events into published state
//! - Async operations never return errors: failures become the published
//!   `error` message
//! - Each test category holds a generation counter; a start whose stream
//!   arrives after a newer start/stop discards that stream

use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::analyser::LevelAnalyser;
use crate::errors::{EnvironmentError, MediaError, LABELS_PENDING_MESSAGE};
use crate::model::{DeviceCatalog, Label, PermissionName, PermissionState, PermissionStatus};
use crate::platform::{
    stop_all_tracks, AudioSink, MediaConstraints, MediaPlatform, MediaStream, VideoSink,
};
use crate::settings::CheckerSettings;
use crate::tone::ToneGraph;

const COMPONENT: &str = "media_devices";

/// Lock that survives a poisoned mutex; teardown must never panic
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Published State
// ============================================================================

/// Observable state shared with background tasks
struct Signals {
    devices: watch::Sender<DeviceCatalog>,
    mic_level: watch::Sender<f32>,
    is_mic_testing: watch::Sender<bool>,
    is_video_on: watch::Sender<bool>,
    error: watch::Sender<Option<String>>,
    output_selection_supported: watch::Sender<bool>,
    permission_status: watch::Sender<Option<PermissionStatus>>,
    is_secure_context: watch::Sender<bool>,
}

impl Signals {
    fn new(output_selection_supported: bool, is_secure_context: bool) -> Self {
        Self {
            devices: watch::channel(DeviceCatalog::default()).0,
            mic_level: watch::channel(0.0).0,
            is_mic_testing: watch::channel(false).0,
            is_video_on: watch::channel(false).0,
            error: watch::channel(None).0,
            output_selection_supported: watch::channel(output_selection_supported).0,
            permission_status: watch::channel(None).0,
            is_secure_context: watch::channel(is_secure_context).0,
        }
    }
}

// ============================================================================
// Session Resources
// ============================================================================

/// Sampling loop state; `running` is checked under the same lock that
/// publishes a level
struct MeterLoop {
    running: bool,
    analyser: Option<LevelAnalyser>,
}

#[derive(Default)]
struct MicSession {
    generation: u64,
    stream: Option<Arc<dyn MediaStream>>,
    meter: Option<Arc<Mutex<MeterLoop>>>,
    cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct VideoSession {
    generation: u64,
    stream: Option<Arc<dyn MediaStream>>,
}

/// `claimed` is the sink the latest start attached its graph to
#[derive(Default)]
struct ToneSlot {
    generation: u64,
    claimed: Option<Arc<dyn AudioSink>>,
    session: Option<ToneSession>,
}

/// Permission-change watchers; `generation` moves on every teardown
#[derive(Default)]
struct PermissionWatch {
    generation: u64,
    token: Option<CancellationToken>,
}

struct ToneSession {
    generation: u64,
    graph: Arc<ToneGraph>,
    sink: Arc<dyn AudioSink>,
    cancel: CancellationToken,
}

impl ToneSession {
    fn finish(self) {
        self.cancel.cancel();
        self.graph.stop();
        self.sink.pause();
        self.sink.set_source(None);
        self.graph.close();
    }
}

// ============================================================================
// DeviceSessionManager
// ============================================================================

/// Sole owner of the checker's media resources
pub struct DeviceSessionManager {
    platform: Arc<dyn MediaPlatform>,
    settings: CheckerSettings,
    signals: Arc<Signals>,
    mic: Mutex<MicSession>,
    video: Mutex<VideoSession>,
    tone: Arc<Mutex<ToneSlot>>,
    device_watch: Mutex<Option<CancellationToken>>,
    permission_watch: Mutex<PermissionWatch>,
    weak_self: Weak<DeviceSessionManager>,
}

impl DeviceSessionManager {
    /// Create a manager and start device-change monitoring when a tokio
    /// runtime is available
    pub fn new(platform: Arc<dyn MediaPlatform>, settings: CheckerSettings) -> Arc<Self> {
        let caps = platform.capabilities();
        let output_selection = caps.media_available && caps.output_selection;
        let secure = caps.media_available && caps.secure_context;

        let manager = Arc::new_cyclic(|weak| Self {
            platform,
            settings,
            signals: Arc::new(Signals::new(output_selection, secure)),
            mic: Mutex::new(MicSession::default()),
            video: Mutex::new(VideoSession::default()),
            tone: Arc::new(Mutex::new(ToneSlot::default())),
            device_watch: Mutex::new(None),
            permission_watch: Mutex::new(PermissionWatch::default()),
            weak_self: weak.clone(),
        });

        if caps.media_available {
            manager.watch_device_changes();
        }
        manager
    }

    pub fn settings(&self) -> &CheckerSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Published state
    // ------------------------------------------------------------------

    pub fn devices(&self) -> DeviceCatalog {
        self.signals.devices.borrow().clone()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<DeviceCatalog> {
        self.signals.devices.subscribe()
    }

    pub fn mic_level(&self) -> f32 {
        *self.signals.mic_level.borrow()
    }

    pub fn subscribe_mic_level(&self) -> watch::Receiver<f32> {
        self.signals.mic_level.subscribe()
    }

    pub fn is_mic_testing(&self) -> bool {
        *self.signals.is_mic_testing.borrow()
    }

    pub fn subscribe_is_mic_testing(&self) -> watch::Receiver<bool> {
        self.signals.is_mic_testing.subscribe()
    }

    pub fn is_video_on(&self) -> bool {
        *self.signals.is_video_on.borrow()
    }

    pub fn subscribe_is_video_on(&self) -> watch::Receiver<bool> {
        self.signals.is_video_on.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        self.signals.error.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.signals.error.subscribe()
    }

    pub fn output_selection_supported(&self) -> bool {
        *self.signals.output_selection_supported.borrow()
    }

    pub fn permission_status(&self) -> Option<PermissionStatus> {
        *self.signals.permission_status.borrow()
    }

    pub fn subscribe_permission_status(&self) -> watch::Receiver<Option<PermissionStatus>> {
        self.signals.permission_status.subscribe()
    }

    pub fn is_secure_context(&self) -> bool {
        *self.signals.is_secure_context.borrow()
    }

    pub fn is_tone_playing(&self) -> bool {
        lock(&self.tone).session.is_some()
    }

    pub fn is_monitoring_devices(&self) -> bool {
        lock(&self.device_watch)
            .as_ref()
            .map_or(false, |token| !token.is_cancelled())
    }

    fn set_error(&self, message: impl Into<String>) {
        self.signals.error.send_replace(Some(message.into()));
    }

    fn clear_error(&self) {
        self.signals.error.send_replace(None);
    }

    fn set_environment_error(&self, err: EnvironmentError) {
        log_error!(COMPONENT, "environment_check_failed", err.to_string());
        self.set_error(err.user_message());
    }

    // ------------------------------------------------------------------
    // Device-change monitoring
    // ------------------------------------------------------------------

    /// Subscribe to device plug/unplug notifications and re-enumerate on
    /// each one. Idempotent.
    pub fn watch_device_changes(&self) {
        let mut slot = lock(&self.device_watch);
        if slot.as_ref().map_or(false, |token| !token.is_cancelled()) {
            return;
        }
        let caps = self.platform.capabilities();
        if !caps.media_available || !caps.device_change_events {
            return;
        }
        let Some(mut changes) = self.platform.subscribe_device_changes() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log_warn!(
                COMPONENT,
                "device_watch_skipped",
                "No async runtime; device changes will not be monitored"
            );
            return;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let manager = self.weak_self.clone();
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            let Some(manager) = manager.upgrade() else { break };
                            log_info!(COMPONENT, "device_change", "Device change detected, refreshing...");
                            manager.refresh_devices().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
        *slot = Some(token);
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Query microphone/camera permission without prompting
    ///
    /// Returns `None` when the platform cannot answer. Later permission
    /// changes update the published status.
    pub async fn check_permissions(&self) -> Option<PermissionStatus> {
        let caps = self.platform.capabilities();
        if !caps.media_available {
            return None;
        }
        if !caps.permissions_query {
            log_info!(COMPONENT, "permissions_unsupported", "Permissions API not supported");
            return None;
        }

        let watch_generation = lock(&self.permission_watch).generation;
        let (mic, camera) = tokio::join!(
            self.platform.query_permission(PermissionName::Microphone),
            self.platform.query_permission(PermissionName::Camera),
        );
        let mic = self.permission_receiver(PermissionName::Microphone, mic);
        let camera = self.permission_receiver(PermissionName::Camera, camera);

        let current = |rx: &Option<watch::Receiver<PermissionState>>| {
            rx.as_ref().map(|rx| *rx.borrow()).unwrap_or_default()
        };
        let status = PermissionStatus {
            microphone: current(&mic),
            camera: current(&camera),
        };
        self.signals.permission_status.send_replace(Some(status));
        log_info_details!(
            COMPONENT,
            "permission_status",
            json!({ "microphone": status.microphone, "camera": status.camera })
        );

        self.watch_permission_changes(
            watch_generation,
            [
                (PermissionName::Microphone, mic),
                (PermissionName::Camera, camera),
            ],
        );
        Some(status)
    }

    fn permission_receiver(
        &self,
        name: PermissionName,
        result: Result<watch::Receiver<PermissionState>, MediaError>,
    ) -> Option<watch::Receiver<PermissionState>> {
        match result {
            Ok(rx) => Some(rx),
            Err(e) => {
                log_warn!(
                    COMPONENT,
                    "permission_query_failed",
                    format!("{:?}: {}", name, e)
                );
                None
            }
        }
    }

    /// Follow permission changes until the next query or teardown; a
    /// query that a teardown overtook starts no watchers
    fn watch_permission_changes(
        &self,
        generation: u64,
        receivers: [(PermissionName, Option<watch::Receiver<PermissionState>>); 2],
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log_warn!(
                COMPONENT,
                "permission_watch_skipped",
                "No async runtime; permission changes will not be monitored"
            );
            return;
        };

        let token = CancellationToken::new();
        {
            let mut watcher = lock(&self.permission_watch);
            if watcher.generation != generation {
                log_debug!(
                    COMPONENT,
                    "permission_watch_superseded",
                    "Permission query finished after teardown, not watching"
                );
                return;
            }
            if let Some(previous) = watcher.token.replace(token.clone()) {
                previous.cancel();
            }
        }

        for (name, rx) in receivers {
            let Some(mut rx) = rx else { continue };
            let signals = Arc::clone(&self.signals);
            let cancelled = token.clone();
            runtime.spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancelled.cancelled() => break,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let state = *rx.borrow_and_update();
                            signals.permission_status.send_modify(|status| {
                                if let Some(status) = status {
                                    status.set(name, state);
                                }
                            });
                        }
                    }
                }
            });
        }
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Enumerate devices and publish a fresh catalog
    pub async fn refresh_devices(&self) {
        let caps = self.platform.capabilities();
        if !caps.media_available {
            self.set_environment_error(EnvironmentError::PlatformUnavailable);
            return;
        }
        if !self.is_secure_context() {
            self.set_environment_error(EnvironmentError::InsecureContext);
            return;
        }
        if !caps.enumerate_devices {
            self.set_environment_error(EnvironmentError::CapabilityMissing("enumerate_devices"));
            return;
        }

        log_debug!(COMPONENT, "enumerate_devices", "Enumerating devices...");
        let all = match self.platform.enumerate_devices().await {
            Ok(all) => all,
            Err(e) => {
                log_error!(COMPONENT, "enumerate_devices_failed", e.to_string());
                self.set_error(e.user_message());
                return;
            }
        };

        // devices present but all unlabeled: permission not granted yet
        let labels_pending = !all.is_empty() && all.iter().all(|d| !d.has_label());
        let catalog = DeviceCatalog::partition(all);

        log_info_details!(
            COMPONENT,
            "devices_categorized",
            json!({
                "audio_inputs": catalog.audio_inputs.len(),
                "audio_outputs": catalog.audio_outputs.len(),
                "video_inputs": catalog.video_inputs.len(),
                "labels_pending": labels_pending,
            })
        );

        if labels_pending {
            log_warn!(
                COMPONENT,
                "labels_pending",
                "Devices found but no labels - permissions may not be granted"
            );
            self.set_error(LABELS_PENDING_MESSAGE);
        }

        self.signals.devices.send_replace(catalog);

        if !labels_pending {
            self.clear_error();
        }
    }

    /// Trigger the permission prompt with a transient capture stream
    ///
    /// The stream is stopped as soon as it is granted. Returns whether
    /// access was granted.
    pub async fn ensure_permissions(&self, want_audio: bool, want_video: bool) -> bool {
        let caps = self.platform.capabilities();
        if !caps.media_available {
            log_info!(
                COMPONENT,
                "ensure_permissions_skipped",
                "Media platform unavailable, skipping permission request"
            );
            return false;
        }
        if !self.is_secure_context() {
            self.set_environment_error(EnvironmentError::InsecureContext);
            return false;
        }
        if !caps.user_media {
            self.set_environment_error(EnvironmentError::CapabilityMissing("get_user_media"));
            return false;
        }

        let constraints = MediaConstraints::permission_request(want_audio, want_video);
        if constraints.is_empty() {
            return false;
        }

        log_info_details!(
            COMPONENT,
            "requesting_permissions",
            json!({ "audio": want_audio, "video": want_video })
        );
        match self.platform.get_user_media(&constraints).await {
            Ok(stream) => {
                stop_all_tracks(stream.as_ref());
                log_info!(COMPONENT, "permissions_granted", "Permissions granted");
                self.clear_error();
                self.check_permissions().await;
                true
            }
            Err(e) => {
                log_error!(COMPONENT, "permission_error", e.to_string());
                self.set_error(e.user_message());
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Microphone test
    // ------------------------------------------------------------------

    /// Capture from a microphone and publish its peak level every frame
    pub async fn start_mic_test(&self, device_id: Option<&str>) {
        let caps = self.platform.capabilities();
        if !caps.media_available || !caps.user_media {
            return;
        }
        self.stop_mic_test();
        let generation = lock(&self.mic).generation;

        let constraints = MediaConstraints::audio_only(device_id);
        let stream = match self.platform.get_user_media(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_mic_test(generation, &e);
                return;
            }
        };

        let analyser = match LevelAnalyser::connect(Arc::clone(&stream), self.settings.meter.fft_size) {
            Ok(analyser) => analyser,
            Err(e) => {
                stop_all_tracks(stream.as_ref());
                self.fail_mic_test(generation, &e);
                return;
            }
        };

        let mut mic = lock(&self.mic);
        if mic.generation != generation {
            drop(mic);
            stop_all_tracks(stream.as_ref());
            log_debug_details!(
                COMPONENT,
                "mic_test_superseded",
                json!({ "stream": stream.id(), "generation": generation }),
                "Discarding microphone stream from a superseded start"
            );
            return;
        }

        let meter = Arc::new(Mutex::new(MeterLoop {
            running: true,
            analyser: Some(analyser),
        }));
        let cancel = CancellationToken::new();
        mic.stream = Some(stream);
        mic.meter = Some(Arc::clone(&meter));
        mic.cancel = Some(cancel.clone());
        self.signals.is_mic_testing.send_replace(true);
        drop(mic);

        let interval = Duration::from_millis(self.settings.meter.frame_interval_ms.max(1));
        tokio::spawn(run_meter_loop(meter, cancel, Arc::clone(&self.signals), interval));
        log_info!(
            COMPONENT,
            "mic_test_started",
            format!("device={}", device_id.unwrap_or("default"))
        );
    }

    fn fail_mic_test(&self, generation: u64, err: &MediaError) {
        log_error_details!(
            COMPONENT,
            "mic_test_failed",
            json!({ "name": err.name, "generation": generation }),
            err.to_string()
        );
        let current = lock(&self.mic).generation == generation;
        if current {
            self.set_error(err.user_message());
            self.stop_mic_test();
        }
    }

    /// Stop the microphone test; idempotent
    pub fn stop_mic_test(&self) {
        let mut mic = lock(&self.mic);
        mic.generation += 1;
        if let Some(meter) = mic.meter.take() {
            let mut meter = lock(&meter);
            meter.running = false;
            if let Some(mut analyser) = meter.analyser.take() {
                analyser.disconnect();
            }
        }
        if let Some(cancel) = mic.cancel.take() {
            cancel.cancel();
        }
        let stream = mic.stream.take();
        self.signals.is_mic_testing.send_replace(false);
        self.signals.mic_level.send_replace(0.0);
        drop(mic);

        if let Some(stream) = stream {
            stop_all_tracks(stream.as_ref());
            log_info!(COMPONENT, "mic_test_stopped", format!("stream={}", stream.id()));
        }
    }

    // ------------------------------------------------------------------
    // Camera preview
    // ------------------------------------------------------------------

    /// Attach a camera stream to the sink and start playback
    pub async fn start_video(&self, sink: &Arc<dyn VideoSink>, device_id: Option<&str>) {
        let caps = self.platform.capabilities();
        if !caps.media_available || !caps.user_media {
            return;
        }
        self.stop_video(Some(sink.as_ref()));
        let generation = lock(&self.video).generation;

        let constraints = MediaConstraints::video_only(device_id);
        let stream = match self.platform.get_user_media(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_video(generation, &e, sink.as_ref());
                return;
            }
        };

        {
            let mut video = lock(&self.video);
            if video.generation != generation {
                drop(video);
                stop_all_tracks(stream.as_ref());
                return;
            }
            video.stream = Some(Arc::clone(&stream));
        }

        sink.set_source(Some(stream));
        match sink.play().await {
            Ok(()) => {
                let video = lock(&self.video);
                if video.generation == generation {
                    self.signals.is_video_on.send_replace(true);
                    log_info!(
                        COMPONENT,
                        "video_started",
                        format!("device={}", device_id.unwrap_or("default"))
                    );
                }
            }
            Err(e) => self.fail_video(generation, &e, sink.as_ref()),
        }
    }

    fn fail_video(&self, generation: u64, err: &MediaError, sink: &dyn VideoSink) {
        log_error!(COMPONENT, "video_failed", err.to_string());
        let current = lock(&self.video).generation == generation;
        if current {
            self.set_error(err.user_message());
            self.stop_video(Some(sink));
        }
    }

    /// Stop the camera preview; safe when not started
    pub fn stop_video(&self, sink: Option<&dyn VideoSink>) {
        let stream = {
            let mut video = lock(&self.video);
            video.generation += 1;
            self.signals.is_video_on.send_replace(false);
            video.stream.take()
        };
        if let Some(sink) = sink {
            sink.pause();
            sink.set_source(None);
        }
        if let Some(stream) = stream {
            stop_all_tracks(stream.as_ref());
            log_info!(COMPONENT, "video_stopped", format!("stream={}", stream.id()));
        }
    }

    // ------------------------------------------------------------------
    // Speaker test
    // ------------------------------------------------------------------

    /// Play the test tone through the sink, optionally on a chosen output
    ///
    /// The tone tears itself down after the configured duration.
    pub async fn play_test_tone(&self, sink: &Arc<dyn AudioSink>, output_device_id: Option<&str>) {
        if !self.platform.capabilities().media_available {
            return;
        }
        self.stop_test_tone();
        let generation = {
            let mut slot = lock(&self.tone);
            slot.claimed = Some(Arc::clone(sink));
            slot.generation
        };

        let graph = Arc::new(ToneGraph::new(&self.settings.tone));
        sink.set_source(Some(Arc::clone(&graph)));

        if self.output_selection_supported() {
            if let Some(id) = output_device_id.filter(|id| !id.is_empty()) {
                if let Err(e) = sink.set_sink_id(id).await {
                    log_warn_details!(
                        COMPONENT,
                        "set_sink_id_failed",
                        json!({ "output": id, "name": e.name }),
                        e.to_string()
                    );
                    self.set_error(Label::OutputSwitchUnsupported.text());
                }
            }
        }

        let played = sink.play().await;

        let mut slot = lock(&self.tone);
        if slot.generation != generation {
            let reused = slot
                .claimed
                .as_ref()
                .map_or(false, |claimed| same_sink(claimed, sink));
            drop(slot);
            if !reused {
                sink.pause();
                sink.set_source(None);
            }
            graph.close();
            log_debug!(
                COMPONENT,
                "test_tone_superseded",
                "Discarding test tone from a superseded start"
            );
            return;
        }
        if let Err(e) = played {
            drop(slot);
            log_error!(COMPONENT, "test_tone_failed", e.to_string());
            self.set_error(e.user_message());
            sink.set_source(None);
            graph.close();
            return;
        }
        graph.start();

        let cancel = CancellationToken::new();
        slot.session = Some(ToneSession {
            generation,
            graph,
            sink: Arc::clone(sink),
            cancel: cancel.clone(),
        });
        drop(slot);

        let slot = Arc::clone(&self.tone);
        let duration = Duration::from_millis(self.settings.tone.duration_ms);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = cancel.cancelled() => return,
            }
            let finished = {
                let mut slot = lock(&slot);
                if slot.session.as_ref().map(|session| session.generation) == Some(generation) {
                    slot.session.take()
                } else {
                    None
                }
            };
            if let Some(session) = finished {
                session.finish();
            }
        });
        log_info!(
            COMPONENT,
            "test_tone_started",
            format!("output={}", output_device_id.unwrap_or("default"))
        );
    }

    /// End a playing test tone early; a start still awaiting playback
    /// is discarded
    pub fn stop_test_tone(&self) {
        let session = {
            let mut slot = lock(&self.tone);
            slot.generation += 1;
            slot.claimed = None;
            slot.session.take()
        };
        if let Some(session) = session {
            session.finish();
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Release every session resource and subscription; safe to repeat
    pub fn cleanup_all(&self, video_sink: Option<&dyn VideoSink>) {
        self.stop_mic_test();
        self.stop_video(video_sink);
        self.stop_test_tone();

        if let Some(token) = lock(&self.device_watch).take() {
            token.cancel();
        }
        let permission_token = {
            let mut watcher = lock(&self.permission_watch);
            watcher.generation += 1;
            watcher.token.take()
        };
        if let Some(token) = permission_token {
            token.cancel();
        }
        log_debug!(COMPONENT, "cleanup_all", "All media sessions released");
    }
}

impl Drop for DeviceSessionManager {
    fn drop(&mut self) {
        self.cleanup_all(None);
    }
}

fn same_sink(a: &Arc<dyn AudioSink>, b: &Arc<dyn AudioSink>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Per-frame level sampling; exits once the running flag clears
async fn run_meter_loop(
    meter: Arc<Mutex<MeterLoop>>,
    cancel: CancellationToken,
    signals: Arc<Signals>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let mut meter = lock(&meter);
        if !meter.running {
            break;
        }
        let Some(analyser) = meter.analyser.as_mut() else {
            break;
        };
        let level = analyser.sample_peak();
        signals.mic_level.send_replace(level);
    }
}
