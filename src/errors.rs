//! Error taxonomy for the device checker
//!
//! Platform failures carry the platform's error name; the manager maps
//! them through a fixed cause table into the message it publishes.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

use crate::model::Label;

/// Informational message while device labels are hidden
pub const LABELS_PENDING_MESSAGE: &str = "ℹ️ Click \"Request Permissions\" to see device names";

/// Published when media access is attempted outside a secure context
pub const INSECURE_CONTEXT_MESSAGE: &str =
    "⚠️ Media devices require HTTPS or localhost. Please use a secure connection.";

/// Failure reported by the media platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct MediaError {
    /// Platform error name (e.g. `NotAllowedError`)
    pub name: String,
    pub message: String,
}

impl MediaError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new("NotAllowedError", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFoundError", message)
    }

    pub fn not_readable(message: impl Into<String>) -> Self {
        Self::new("NotReadableError", message)
    }

    pub fn overconstrained(message: impl Into<String>) -> Self {
        Self::new("OverconstrainedError", message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new("NotSupportedError", message)
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::new("AbortError", message)
    }

    pub fn cause(&self) -> ErrorCause {
        ErrorCause::from_error_name(&self.name)
    }

    /// Human-readable message for the dialog
    pub fn user_message(&self) -> String {
        match CAUSE_MESSAGES.get(&self.cause()) {
            Some(text) => (*text).to_string(),
            None if !self.message.is_empty() => self.message.clone(),
            None => self.to_string(),
        }
    }
}

/// Classification of platform failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    PermissionDenied,
    NotFound,
    DeviceBusy,
    Overconstrained,
    Security,
    Unknown,
}

impl ErrorCause {
    pub fn from_error_name(name: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => ErrorCause::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => ErrorCause::NotFound,
            "NotReadableError" | "TrackStartError" => ErrorCause::DeviceBusy,
            "OverconstrainedError" => ErrorCause::Overconstrained,
            "SecurityError" => ErrorCause::Security,
            _ => ErrorCause::Unknown,
        }
    }
}

static CAUSE_MESSAGES: Lazy<HashMap<ErrorCause, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            ErrorCause::PermissionDenied,
            "🚫 Permission denied. Please allow access to your camera/microphone in browser settings.",
        ),
        (
            ErrorCause::NotFound,
            "📷 No camera or microphone found. Please connect a device.",
        ),
        (
            ErrorCause::DeviceBusy,
            "⚠️ Device is already in use by another application.",
        ),
        (
            ErrorCause::Overconstrained,
            "⚠️ No device matches the requested constraints.",
        ),
        (
            ErrorCause::Security,
            "🔒 Security error. Please use HTTPS or localhost.",
        ),
    ])
});

/// Environment checks that stop an operation before it touches devices
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("media platform is not available in this execution context")]
    PlatformUnavailable,

    #[error("media access requires a secure context")]
    InsecureContext,

    #[error("platform capability missing: {0}")]
    CapabilityMissing(&'static str),
}

impl EnvironmentError {
    pub fn user_message(&self) -> &'static str {
        match self {
            EnvironmentError::InsecureContext => INSECURE_CONTEXT_MESSAGE,
            EnvironmentError::PlatformUnavailable | EnvironmentError::CapabilityMissing(_) => {
                Label::BrowserNotSupported.text()
            }
        }
    }
}
