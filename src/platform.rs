//! Media platform capability boundary
//!
//! Everything the session manager needs from the host media stack is
//! expressed here: device enumeration, capture-stream acquisition,
//! permission queries, device-change notifications and the rendering
//! sinks supplied by the embedder.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::errors::MediaError;
use crate::model::{DeviceDescriptor, PermissionName, PermissionState};
use crate::tone::ToneGraph;

// ============================================================================
// Capabilities
// ============================================================================

/// Feature detection result for a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Media APIs exist at all in this execution context
    pub media_available: bool,
    /// Secure context (HTTPS/localhost or a native host)
    pub secure_context: bool,
    pub enumerate_devices: bool,
    pub user_media: bool,
    pub permissions_query: bool,
    /// Audio sinks can be routed to a chosen output device
    pub output_selection: bool,
    pub device_change_events: bool,
}

impl PlatformCapabilities {
    /// Every capability present
    pub fn full() -> Self {
        Self {
            media_available: true,
            secure_context: true,
            enumerate_devices: true,
            user_media: true,
            permissions_query: true,
            output_selection: true,
            device_change_events: true,
        }
    }

    /// Execution context without any media support
    pub fn unavailable() -> Self {
        Self {
            media_available: false,
            secure_context: false,
            enumerate_devices: false,
            user_media: false,
            permissions_query: false,
            output_selection: false,
            device_change_events: false,
        }
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// Per-kind capture constraint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackConstraint {
    #[default]
    Disabled,
    /// Any device of the kind (platform default)
    Any,
    /// Exactly this device id
    Exact(String),
}

impl TrackConstraint {
    pub fn from_device(device_id: Option<&str>) -> Self {
        match device_id {
            Some(id) if !id.is_empty() => TrackConstraint::Exact(id.to_string()),
            _ => TrackConstraint::Any,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, TrackConstraint::Disabled)
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            TrackConstraint::Exact(id) => Some(id),
            _ => None,
        }
    }
}

/// Capture request passed to [`MediaPlatform::get_user_media`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaConstraints {
    pub audio: TrackConstraint,
    pub video: TrackConstraint,
}

impl MediaConstraints {
    /// Transient request used only to trigger the permission prompt
    pub fn permission_request(audio: bool, video: bool) -> Self {
        let flag = |on: bool| if on { TrackConstraint::Any } else { TrackConstraint::Disabled };
        Self {
            audio: flag(audio),
            video: flag(video),
        }
    }

    pub fn audio_only(device_id: Option<&str>) -> Self {
        Self {
            audio: TrackConstraint::from_device(device_id),
            video: TrackConstraint::Disabled,
        }
    }

    pub fn video_only(device_id: Option<&str>) -> Self {
        Self {
            audio: TrackConstraint::Disabled,
            video: TrackConstraint::from_device(device_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio.is_enabled() && !self.video.is_enabled()
    }
}

// ============================================================================
// Streams
// ============================================================================

/// Kind of a capture track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One live capture track
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Device the track captures from
    fn device_id(&self) -> &str;

    /// Release the underlying device; idempotent
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Capture stream returned by [`MediaPlatform::get_user_media`]
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    /// Copy the most recent mono audio samples (in [-1, 1]) into the tail
    /// of `out`; returns how many were written. Streams without audio
    /// return 0.
    fn read_time_domain(&self, out: &mut [f32]) -> usize;

    fn has_audio(&self) -> bool {
        self.tracks().iter().any(|t| t.kind() == TrackKind::Audio)
    }

    fn is_active(&self) -> bool {
        self.tracks().iter().any(|t| t.is_live())
    }
}

/// Stop every track of a stream
pub fn stop_all_tracks(stream: &dyn MediaStream) {
    for track in stream.tracks() {
        track.stop();
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Host media stack
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    fn capabilities(&self) -> PlatformCapabilities;

    /// Query a permission without prompting. The receiver holds the
    /// current state and observes later changes.
    async fn query_permission(
        &self,
        name: PermissionName,
    ) -> Result<watch::Receiver<PermissionState>, MediaError>;

    /// List all devices; labels may be empty before permission is granted
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, MediaError>;

    /// Acquire a capture stream (may prompt the user)
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError>;

    /// Device plug/unplug notifications, if the platform emits them
    fn subscribe_device_changes(&self) -> Option<broadcast::Receiver<()>>;
}

// ============================================================================
// Sinks
// ============================================================================

/// Rendering target for a camera preview
#[async_trait]
pub trait VideoSink: Send + Sync {
    fn set_source(&self, stream: Option<Arc<dyn MediaStream>>);

    async fn play(&self) -> Result<(), MediaError>;

    fn pause(&self);
}

/// Speaker element used for the test tone
#[async_trait]
pub trait AudioSink: Send + Sync {
    fn set_source(&self, tone: Option<Arc<ToneGraph>>);

    /// Route playback to an output device
    async fn set_sink_id(&self, device_id: &str) -> Result<(), MediaError>;

    async fn play(&self) -> Result<(), MediaError>;

    fn pause(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_request_constraints() {
        let both = MediaConstraints::permission_request(true, true);
        assert_eq!(both.audio, TrackConstraint::Any);
        assert_eq!(both.video, TrackConstraint::Any);

        let none = MediaConstraints::permission_request(false, false);
        assert!(none.is_empty());
    }

    #[test]
    fn test_device_constraints() {
        let exact = MediaConstraints::audio_only(Some("mic-2"));
        assert_eq!(exact.audio.device_id(), Some("mic-2"));
        assert!(!exact.video.is_enabled());

        let default = MediaConstraints::video_only(None);
        assert_eq!(default.video, TrackConstraint::Any);
        assert_eq!(default.video.device_id(), None);

        // an empty picker value means "default device"
        assert_eq!(TrackConstraint::from_device(Some("")), TrackConstraint::Any);
    }
}
