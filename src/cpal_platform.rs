//! Native media platform on cpal
//!
//! Audio input/output devices only; camera capture is not available.
//! Every cpal stream lives on its own thread (streams are not `Send` on
//! all hosts) and is dropped when that thread receives its shutdown
//! signal. Device ids are device names.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};

use crate::errors::MediaError;
use crate::model::{DeviceDescriptor, DeviceKind, PermissionName, PermissionState};
use crate::platform::{
    AudioSink, MediaConstraints, MediaPlatform, MediaStream, MediaTrack, PlatformCapabilities,
    TrackConstraint, TrackKind,
};
use crate::tone::ToneGraph;

const COMPONENT: &str = "cpal_platform";

/// Capture ring capacity in mono samples (~1.3 s at 48 kHz)
const CAPTURE_CAPACITY: usize = 65536;

/// Samples kept for time-domain reads; covers the largest analyser window
const HISTORY_LEN: usize = 16384;

const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ============================================================================
// Stream threads
// ============================================================================

/// Thread owning one running cpal stream
struct StreamThread {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    /// Build and start a stream on a dedicated thread; resolves once the
    /// stream is playing or has failed
    async fn spawn<F>(build: F) -> Result<Self, MediaError>
    where
        F: FnOnce() -> Result<cpal::Stream, MediaError> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = std::thread::spawn(move || {
            let stream = match build() {
                Ok(stream) => stream,
                Err(e) => {
                    ready_tx.send(Err(e)).ok();
                    return;
                }
            };
            if let Err(e) = stream.play() {
                ready_tx.send(Err(MediaError::not_readable(e.to_string()))).ok();
                return;
            }
            ready_tx.send(Ok(())).ok();
            // stream is dropped when the shutdown signal arrives
            shutdown_rx.recv().ok();
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                shutdown: shutdown_tx,
                handle,
            }),
            Ok(Err(e)) => {
                handle.join().ok();
                Err(e)
            }
            Err(_) => {
                handle.join().ok();
                Err(MediaError::abort("Audio stream thread exited"))
            }
        }
    }

    fn stop(self) {
        self.shutdown.send(()).ok();
        self.handle.join().ok();
    }
}

fn find_input_device(host: &cpal::Host, id: Option<&str>) -> Result<cpal::Device, MediaError> {
    match id {
        Some(id) => host
            .input_devices()
            .map_err(|e| MediaError::abort(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(id))
            .ok_or_else(|| MediaError::overconstrained(format!("Input device not found: {}", id))),
        None => host
            .default_input_device()
            .ok_or_else(|| MediaError::not_found("No default input device")),
    }
}

fn find_output_device(host: &cpal::Host, id: Option<&str>) -> Result<cpal::Device, MediaError> {
    match id {
        Some(id) => host
            .output_devices()
            .map_err(|e| MediaError::abort(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(id))
            .ok_or_else(|| MediaError::not_found(format!("Output device not found: {}", id))),
        None => host
            .default_output_device()
            .ok_or_else(|| MediaError::not_found("No default output device")),
    }
}

/// Input and output device names, for change detection
fn device_names(host: &cpal::Host) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(inputs) = host.input_devices() {
        names.extend(inputs.filter_map(|d| d.name().ok()).map(|n| format!("in:{}", n)));
    }
    if let Ok(outputs) = host.output_devices() {
        names.extend(outputs.filter_map(|d| d.name().ok()).map(|n| format!("out:{}", n)));
    }
    names.sort();
    names
}

// ============================================================================
// Capture
// ============================================================================

/// Average interleaved frames to mono and queue them; drops on overflow
fn push_mono<T: cpal::Sample>(data: &[T], channels: usize, producer: &mut HeapProd<f32>) {
    for frame in data.chunks(channels.max(1)) {
        let sum: f32 = frame.iter().map(|s| s.to_f32()).sum();
        if producer.try_push(sum / frame.len() as f32).is_err() {
            break;
        }
    }
}

fn build_capture<T: cpal::Sample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| push_mono(data, channels, &mut producer),
        |err| tracing::warn!("input stream error: {}", err),
    )
}

pub struct CpalTrack {
    device_id: String,
    live: AtomicBool,
    thread: Mutex<Option<StreamThread>>,
}

impl MediaTrack for CpalTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
        let thread = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(thread) = thread {
            thread.stop();
            log_debug!(COMPONENT, "capture_stopped", self.device_id.clone());
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Microphone capture stream
pub struct CpalStream {
    id: String,
    track: Arc<CpalTrack>,
    consumer: Mutex<HeapCons<f32>>,
    history: Mutex<VecDeque<f32>>,
}

impl CpalStream {
    fn new(device_id: String, consumer: HeapCons<f32>, thread: Option<StreamThread>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            track: Arc::new(CpalTrack {
                device_id,
                live: AtomicBool::new(true),
                thread: Mutex::new(thread),
            }),
            consumer: Mutex::new(consumer),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }
}

impl MediaStream for CpalStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![Arc::clone(&self.track) as Arc<dyn MediaTrack>]
    }

    fn read_time_domain(&self, out: &mut [f32]) -> usize {
        if !self.track.is_live() {
            return 0;
        }
        let mut consumer = self.consumer.lock().unwrap_or_else(|e| e.into_inner());
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());

        let mut chunk = [0.0f32; 1024];
        loop {
            let n = consumer.pop_slice(&mut chunk);
            if n == 0 {
                break;
            }
            history.extend(&chunk[..n]);
        }
        let excess = history.len().saturating_sub(HISTORY_LEN);
        history.drain(..excess);

        let n = history.len().min(out.len());
        let offset = out.len() - n;
        for (dst, src) in out[offset..].iter_mut().zip(history.iter().skip(history.len() - n)) {
            *dst = *src;
        }
        n
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Device-change poller thread
struct DevicePoller {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// cpal-backed [`MediaPlatform`]
pub struct CpalPlatform {
    device_changes: broadcast::Sender<()>,
    poller: Mutex<Option<DevicePoller>>,
}

impl Default for CpalPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalPlatform {
    pub fn new() -> Self {
        Self {
            device_changes: broadcast::channel(16).0,
            poller: Mutex::new(None),
        }
    }

    fn ensure_poller(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(|e| e.into_inner());
        if poller.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let changes = self.device_changes.clone();
        let handle = std::thread::spawn(move || {
            let host = cpal::default_host();
            let mut known = device_names(&host);
            loop {
                match shutdown_rx.recv_timeout(DEVICE_POLL_INTERVAL) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                let current = device_names(&host);
                if current != known {
                    known = current;
                    tracing::debug!("audio device list changed");
                    changes.send(()).ok();
                }
            }
        });
        *poller = Some(DevicePoller {
            shutdown: shutdown_tx,
            handle,
        });
    }
}

impl Drop for CpalPlatform {
    fn drop(&mut self) {
        let poller = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(poller) = poller {
            poller.shutdown.send(()).ok();
            poller.handle.join().ok();
        }
    }
}

#[async_trait]
impl MediaPlatform for CpalPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            permissions_query: false,
            ..PlatformCapabilities::full()
        }
    }

    async fn query_permission(
        &self,
        _name: PermissionName,
    ) -> Result<watch::Receiver<PermissionState>, MediaError> {
        Err(MediaError::not_supported("Permission queries are not available natively"))
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, MediaError> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        for device in host.input_devices().map_err(|e| MediaError::abort(e.to_string()))? {
            if let Ok(name) = device.name() {
                devices.push(DeviceDescriptor::new(name.clone(), DeviceKind::AudioInput, name, ""));
            }
        }
        for device in host.output_devices().map_err(|e| MediaError::abort(e.to_string()))? {
            if let Ok(name) = device.name() {
                devices.push(DeviceDescriptor::new(name.clone(), DeviceKind::AudioOutput, name, ""));
            }
        }
        Ok(devices)
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        if !constraints.audio.is_enabled() {
            return Err(if constraints.video.is_enabled() {
                MediaError::not_found("Camera capture is not available")
            } else {
                MediaError::new("TypeError", "At least one of audio and video must be requested")
            });
        }
        if constraints.video.is_enabled() {
            log_warn!(
                COMPONENT,
                "video_unavailable",
                "Camera capture is not available; returning audio only"
            );
        }

        let requested = match &constraints.audio {
            TrackConstraint::Exact(id) => Some(id.clone()),
            _ => None,
        };
        let (device, device_id, supported) = {
            let host = cpal::default_host();
            let device = find_input_device(&host, requested.as_deref())?;
            let device_id = device
                .name()
                .map_err(|e| MediaError::not_readable(e.to_string()))?;
            let supported = device
                .default_input_config()
                .map_err(|e| MediaError::not_readable(e.to_string()))?;
            (device, device_id, supported)
        };

        let (producer, consumer) = HeapRb::<f32>::new(CAPTURE_CAPACITY).split();
        let thread = StreamThread::spawn(move || {
            let format = supported.sample_format();
            let config: cpal::StreamConfig = supported.into();
            let stream = match format {
                cpal::SampleFormat::F32 => build_capture::<f32>(&device, &config, producer),
                cpal::SampleFormat::I16 => build_capture::<i16>(&device, &config, producer),
                cpal::SampleFormat::U16 => build_capture::<u16>(&device, &config, producer),
            };
            stream.map_err(|e| MediaError::not_readable(e.to_string()))
        })
        .await?;

        log_info!(COMPONENT, "capture_started", device_id.clone());
        Ok(Arc::new(CpalStream::new(device_id, consumer, Some(thread))))
    }

    fn subscribe_device_changes(&self) -> Option<broadcast::Receiver<()>> {
        self.ensure_poller();
        Some(self.device_changes.subscribe())
    }
}

// ============================================================================
// Speaker sink
// ============================================================================

fn build_playback<T: cpal::Sample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tone: Arc<ToneGraph>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            tone.render(&mut scratch, channels, sample_rate);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = <T as cpal::Sample>::from(src);
            }
        },
        |err| tracing::warn!("output stream error: {}", err),
    )
}

/// Speaker output rendering a [`ToneGraph`]
#[derive(Default)]
pub struct CpalSpeakerSink {
    source: Mutex<Option<Arc<ToneGraph>>>,
    device_id: Mutex<Option<String>>,
    playback: Mutex<Option<StreamThread>>,
}

impl CpalSpeakerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_id(&self) -> Option<String> {
        self.device_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AudioSink for CpalSpeakerSink {
    fn set_source(&self, tone: Option<Arc<ToneGraph>>) {
        *self.source.lock().unwrap_or_else(|e| e.into_inner()) = tone;
    }

    async fn set_sink_id(&self, device_id: &str) -> Result<(), MediaError> {
        let host = cpal::default_host();
        find_output_device(&host, Some(device_id))?;
        *self.device_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(device_id.to_string());
        Ok(())
    }

    async fn play(&self) -> Result<(), MediaError> {
        self.pause();
        let tone = self
            .source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| MediaError::not_supported("No tone source attached"))?;

        let (device, supported) = {
            let host = cpal::default_host();
            let device = find_output_device(&host, self.device_id().as_deref())?;
            let supported = device
                .default_output_config()
                .map_err(|e| MediaError::not_readable(e.to_string()))?;
            (device, supported)
        };

        let thread = StreamThread::spawn(move || {
            let format = supported.sample_format();
            let config: cpal::StreamConfig = supported.into();
            let stream = match format {
                cpal::SampleFormat::F32 => build_playback::<f32>(&device, &config, tone),
                cpal::SampleFormat::I16 => build_playback::<i16>(&device, &config, tone),
                cpal::SampleFormat::U16 => build_playback::<u16>(&device, &config, tone),
            };
            stream.map_err(|e| MediaError::not_readable(e.to_string()))
        })
        .await?;

        *self.playback.lock().unwrap_or_else(|e| e.into_inner()) = Some(thread);
        Ok(())
    }

    fn pause(&self) {
        let playback = self.playback.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(playback) = playback {
            playback.stop();
        }
    }
}

impl Drop for CpalSpeakerSink {
    fn drop(&mut self) {
        self.pause();
    }
}
