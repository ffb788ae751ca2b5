//! Device checker dialog controller
//!
//! Translates user actions (open, pick a device, start/stop a test, save,
//! close) into [`DeviceSessionManager`] calls and reports the outcome to
//! the embedder as [`DialogEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::media_devices::DeviceSessionManager;
use crate::model::{
    display_label, DeviceCatalog, DeviceKind, DeviceSelection, PermissionStatus,
};
use crate::platform::{AudioSink, VideoSink};

const COMPONENT: &str = "dialog";

/// Events sent to the embedder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DialogEvent {
    /// Dialog visibility changed from inside the dialog
    VisibleChange(bool),
    /// User saved the device selection
    SettingsChange(DeviceSelection),
}

/// Rendering elements supplied by the embedder; either may be absent
#[derive(Clone, Default)]
pub struct DialogSinks {
    pub video: Option<Arc<dyn VideoSink>>,
    pub audio: Option<Arc<dyn AudioSink>>,
}

/// Picker value to selection; empty means no selection
fn selection_value(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub struct DeviceCheckerDialog {
    manager: Arc<DeviceSessionManager>,
    sinks: DialogSinks,
    selection: DeviceSelection,
    visible: bool,
    events: mpsc::UnboundedSender<DialogEvent>,
}

impl DeviceCheckerDialog {
    /// Create a controller and the receiver for its embedder events
    pub fn new(
        manager: Arc<DeviceSessionManager>,
        sinks: DialogSinks,
    ) -> (Self, mpsc::UnboundedReceiver<DialogEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let dialog = Self {
            manager,
            sinks,
            selection: DeviceSelection::default(),
            visible: false,
            events,
        };
        (dialog, rx)
    }

    pub fn manager(&self) -> &Arc<DeviceSessionManager> {
        &self.manager
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    fn emit(&self, event: DialogEvent) {
        if self.events.send(event).is_err() {
            log_debug!(COMPONENT, "event_dropped", "Embedder event receiver closed");
        }
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Embedder-driven visibility; `true` opens, `false` closes
    pub async fn set_visible(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        if visible {
            self.visible = true;
            self.open().await;
        } else {
            self.close();
        }
    }

    /// Open sequence; each step completes before the next starts
    async fn open(&self) {
        self.manager.watch_device_changes();
        self.manager.check_permissions().await;
        self.manager.refresh_devices().await;

        let granted = self.manager.ensure_permissions(true, true).await;
        if granted {
            self.manager.refresh_devices().await;
        }

        let devices = self.manager.devices();
        log_info_details!(
            COMPONENT,
            "dialog_opened",
            json!({
                "audio_inputs": devices.audio_inputs.len(),
                "audio_outputs": devices.audio_outputs.len(),
                "video_inputs": devices.video_inputs.len(),
                "permissions_granted": granted,
            })
        );
    }

    /// Release every test and notify the embedder
    pub fn close(&mut self) {
        self.manager.cleanup_all(self.sinks.video.as_deref());
        self.visible = false;
        self.emit(DialogEvent::VisibleChange(false));
    }

    /// Emit the selection, then close
    pub fn save_and_close(&mut self) {
        log_info_details!(
            COMPONENT,
            "selection_saved",
            json!(self.selection)
        );
        self.emit(DialogEvent::SettingsChange(self.selection.clone()));
        self.close();
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    pub async fn start_mic(&self) {
        self.manager
            .start_mic_test(self.selection.audio_input_id.as_deref())
            .await;
    }

    pub fn stop_mic(&self) {
        self.manager.stop_mic_test();
    }

    pub async fn start_video(&self) {
        let Some(sink) = &self.sinks.video else {
            return;
        };
        self.manager
            .start_video(sink, self.selection.video_input_id.as_deref())
            .await;
    }

    pub fn stop_video(&self) {
        self.manager.stop_video(self.sinks.video.as_deref());
    }

    pub async fn test_speaker(&self) {
        let Some(sink) = &self.sinks.audio else {
            return;
        };
        self.manager
            .play_test_tone(sink, self.selection.audio_output_id.as_deref())
            .await;
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn on_audio_input_change(&mut self, value: &str) {
        self.selection.audio_input_id = selection_value(value);
    }

    pub fn on_video_input_change(&mut self, value: &str) {
        self.selection.video_input_id = selection_value(value);
    }

    pub fn on_audio_output_change(&mut self, value: &str) {
        self.selection.audio_output_id = selection_value(value);
    }

    // ------------------------------------------------------------------
    // View state
    // ------------------------------------------------------------------

    pub fn devices(&self) -> DeviceCatalog {
        self.manager.devices()
    }

    /// `(device id, display label)` pairs for a picker
    pub fn device_options(&self, kind: DeviceKind) -> Vec<(String, String)> {
        self.manager
            .devices()
            .of_kind(kind)
            .iter()
            .map(|d| (d.device_id.clone(), display_label(Some(d)).to_string()))
            .collect()
    }

    pub fn mic_level(&self) -> f32 {
        self.manager.mic_level()
    }

    pub fn is_mic_testing(&self) -> bool {
        self.manager.is_mic_testing()
    }

    pub fn is_video_on(&self) -> bool {
        self.manager.is_video_on()
    }

    pub fn error(&self) -> Option<String> {
        self.manager.error()
    }

    pub fn output_selection_supported(&self) -> bool {
        self.manager.output_selection_supported()
    }

    pub fn is_secure_context(&self) -> bool {
        self.manager.is_secure_context()
    }

    pub fn permission_status(&self) -> Option<PermissionStatus> {
        self.manager.permission_status()
    }
}

impl Drop for DeviceCheckerDialog {
    fn drop(&mut self) {
        self.manager.cleanup_all(self.sinks.video.as_deref());
    }
}
