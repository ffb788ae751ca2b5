// Structured Logging Module
// JSON log lines on stderr, filtered by DEVICE_CHECKER_LOG_LEVEL

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json;
use std::io::Write;
use std::time::SystemTime;

/// Environment variable selecting the minimum emitted level
pub const LOG_LEVEL_ENV: &str = "DEVICE_CHECKER_LOG_LEVEL";

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

static MIN_LEVEL: Lazy<LogLevel> = Lazy::new(|| {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|v| LogLevel::parse(&v))
        .unwrap_or(LogLevel::Info)
});

/// Minimum level that reaches the output (read once per process)
pub fn min_level() -> LogLevel {
    *MIN_LEVEL
}

/// Structured log entry
#[derive(Debug, Serialize)]
pub struct LogEntry {
    level: LogLevel,
    component: String,
    event: String,
    message: Option<String>,
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: &str, event: &str) -> Self {
        Self {
            level,
            component: component.to_string(),
            event: event.to_string(),
            message: None,
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            details: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.level >= min_level()
    }

    pub fn log(self) {
        if !self.is_enabled() {
            return;
        }
        // stdout belongs to the embedder event stream
        match serde_json::to_string(&self) {
            Ok(json) => {
                let _ = writeln!(std::io::stderr().lock(), "{}", json);
            }
            Err(_) => eprintln!("Failed to serialize log entry"),
        }
    }
}

/// Convenience macros for structured logging
#[macro_export]
macro_rules! log_info {
    ($component:expr, $event:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Info, $component, $event).log();
    };
    ($component:expr, $event:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Info, $component, $event)
            .with_message($msg)
            .log();
    };
}

#[macro_export]
macro_rules! log_info_details {
    ($component:expr, $event:expr, $details:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Info, $component, $event)
            .with_details($details)
            .log();
    };
    ($component:expr, $event:expr, $details:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Info, $component, $event)
            .with_message($msg)
            .with_details($details)
            .log();
    };
}

#[macro_export]
macro_rules! log_error {
    ($component:expr, $event:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Error, $component, $event)
            .with_message($msg)
            .log();
    };
}

#[macro_export]
macro_rules! log_error_details {
    ($component:expr, $event:expr, $details:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Error, $component, $event)
            .with_details($details)
            .log();
    };
    ($component:expr, $event:expr, $details:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Error, $component, $event)
            .with_message($msg)
            .with_details($details)
            .log();
    };
}

#[macro_export]
macro_rules! log_warn {
    ($component:expr, $event:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Warn, $component, $event)
            .with_message($msg)
            .log();
    };
}

#[macro_export]
macro_rules! log_warn_details {
    ($component:expr, $event:expr, $details:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Warn, $component, $event)
            .with_details($details)
            .log();
    };
    ($component:expr, $event:expr, $details:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Warn, $component, $event)
            .with_message($msg)
            .with_details($details)
            .log();
    };
}

#[macro_export]
macro_rules! log_debug {
    ($component:expr, $event:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Debug, $component, $event)
            .with_message($msg)
            .log();
    };
}

#[macro_export]
macro_rules! log_debug_details {
    ($component:expr, $event:expr, $details:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Debug, $component, $event)
            .with_details($details)
            .log();
    };
    ($component:expr, $event:expr, $details:expr, $msg:expr) => {
        $crate::logger::LogEntry::new($crate::logger::LogLevel::Debug, $component, $event)
            .with_message($msg)
            .with_details($details)
            .log();
    };
}
