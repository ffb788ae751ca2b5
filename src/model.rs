//! Shared device-checker types and UI constants
//!
//! Static enums and label tables live here so that components never
//! hardcode user-facing strings.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Devices
// ============================================================================

/// Device identifier as reported by the platform
pub type DeviceId = String;

/// Kind of a media device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "audioinput")]
    AudioInput,
    #[serde(rename = "audiooutput")]
    AudioOutput,
    #[serde(rename = "videoinput")]
    VideoInput,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::AudioInput => "audioinput",
            DeviceKind::AudioOutput => "audiooutput",
            DeviceKind::VideoInput => "videoinput",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enumerated device (immutable snapshot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub device_id: DeviceId,
    pub kind: DeviceKind,
    /// Empty until the user grants capture permission
    pub label: String,
    pub group_id: String,
}

impl DeviceDescriptor {
    pub fn new(
        device_id: impl Into<String>,
        kind: DeviceKind,
        label: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            label: label.into(),
            group_id: group_id.into(),
        }
    }

    pub fn has_label(&self) -> bool {
        !self.label.is_empty()
    }
}

/// Devices partitioned by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCatalog {
    pub audio_inputs: Vec<DeviceDescriptor>,
    pub audio_outputs: Vec<DeviceDescriptor>,
    pub video_inputs: Vec<DeviceDescriptor>,
}

impl DeviceCatalog {
    /// Build a fresh catalog, keeping enumeration order within each kind
    pub fn partition(devices: impl IntoIterator<Item = DeviceDescriptor>) -> Self {
        let mut catalog = Self::default();
        for device in devices {
            match device.kind {
                DeviceKind::AudioInput => catalog.audio_inputs.push(device),
                DeviceKind::AudioOutput => catalog.audio_outputs.push(device),
                DeviceKind::VideoInput => catalog.video_inputs.push(device),
            }
        }
        catalog
    }

    pub fn of_kind(&self, kind: DeviceKind) -> &[DeviceDescriptor] {
        match kind {
            DeviceKind::AudioInput => &self.audio_inputs,
            DeviceKind::AudioOutput => &self.audio_outputs,
            DeviceKind::VideoInput => &self.video_inputs,
        }
    }

    pub fn len(&self) -> usize {
        self.audio_inputs.len() + self.audio_outputs.len() + self.video_inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Devices the user picked in the dialog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSelection {
    pub audio_input_id: Option<DeviceId>,
    pub audio_output_id: Option<DeviceId>,
    pub video_input_id: Option<DeviceId>,
}

// ============================================================================
// Permissions
// ============================================================================

/// Permission the platform can be queried about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionName {
    Microphone,
    Camera,
}

/// State of one permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    #[default]
    Prompt,
}

/// Advisory permission snapshot; never gates enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub microphone: PermissionState,
    pub camera: PermissionState,
}

impl PermissionStatus {
    pub fn set(&mut self, name: PermissionName, state: PermissionState) {
        match name {
            PermissionName::Microphone => self.microphone = state,
            PermissionName::Camera => self.camera = state,
        }
    }
}

// ============================================================================
// Labels
// ============================================================================

/// User-facing text keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    DialogTitle,
    Microphone,
    Camera,
    Speaker,
    SelectPrompt,
    Start,
    Stop,
    TestSpeaker,
    Save,
    Close,
    UnlabeledDevice,
    BrowserNotSupported,
    OutputSwitchUnsupported,
}

impl Label {
    pub fn text(self) -> &'static str {
        match self {
            Label::DialogTitle => "Audio/Video Device Tester",
            Label::Microphone => "Microphone",
            Label::Camera => "Camera",
            Label::Speaker => "Speaker",
            Label::SelectPrompt => "Select…",
            Label::Start => "Start",
            Label::Stop => "Stop",
            Label::TestSpeaker => "Play test tone",
            Label::Save => "Save",
            Label::Close => "Close",
            Label::UnlabeledDevice => "Unlabeled device",
            Label::BrowserNotSupported => "This feature is not supported in your environment.",
            Label::OutputSwitchUnsupported => {
                "Your browser may not allow changing the speaker output device."
            }
        }
    }
}

/// Label shown for a device in a picker
pub fn display_label(device: Option<&DeviceDescriptor>) -> &str {
    match device {
        Some(d) if !d.label.trim().is_empty() => d.label.trim(),
        _ => Label::UnlabeledDevice.text(),
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Upper bound of the published microphone level
pub const METER_MAX: f32 = 1.0;

/// Default analyser FFT size (the level buffer holds half of it)
pub const ANALYSER_FFT_SIZE: usize = 1024;

/// Default level-meter frame interval (~60 fps)
pub const METER_FRAME_INTERVAL_MS: u64 = 16;

/// Default test tone parameters
pub const TEST_TONE_FREQUENCY_HZ: f32 = 440.0;
pub const TEST_TONE_DURATION_MS: u64 = 800;
pub const TEST_TONE_GAIN: f32 = 0.08;
