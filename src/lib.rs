// Device Checker - Main Library
// Audio/video device session manager and dialog controller

#[macro_use]
pub mod logger;

pub mod analyser;
pub mod cpal_platform;
pub mod dialog;
pub mod errors;
pub mod fake_platform;
pub mod media_devices;
pub mod model;
pub mod platform;
pub mod settings;
pub mod tone;

pub use dialog::{DeviceCheckerDialog, DialogEvent, DialogSinks};
pub use media_devices::DeviceSessionManager;
