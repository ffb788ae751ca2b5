//! Device Checker Settings
//!
//! Tunables for the level meter and the speaker test tone, loaded from a
//! JSON file. Missing fields and a missing file fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{
    ANALYSER_FFT_SIZE, METER_FRAME_INTERVAL_MS, TEST_TONE_DURATION_MS, TEST_TONE_FREQUENCY_HZ,
    TEST_TONE_GAIN,
};

/// Environment variable overriding the settings file path
pub const SETTINGS_PATH_ENV: &str = "DEVICE_CHECKER_SETTINGS";

const SETTINGS_FILENAME: &str = "device_checker.json";

// ============================================================================
// Settings Structs
// ============================================================================

/// Microphone level meter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    /// Analyser FFT size; the sampled window is half of it
    pub fft_size: usize,
    /// Interval between level samples
    pub frame_interval_ms: u64,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            fft_size: ANALYSER_FFT_SIZE,
            frame_interval_ms: METER_FRAME_INTERVAL_MS,
        }
    }
}

/// Speaker test tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    pub frequency_hz: f32,
    pub duration_ms: u64,
    /// Linear gain (0.0 - 1.0)
    pub gain: f32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            frequency_hz: TEST_TONE_FREQUENCY_HZ,
            duration_ms: TEST_TONE_DURATION_MS,
            gain: TEST_TONE_GAIN,
        }
    }
}

/// Device checker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerSettings {
    #[serde(default)]
    pub meter: MeterSettings,

    #[serde(default)]
    pub tone: ToneSettings,

    /// Settings version for future migrations
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            meter: MeterSettings::default(),
            tone: ToneSettings::default(),
            version: 1,
        }
    }
}

impl CheckerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check value ranges
    pub fn is_valid(&self) -> bool {
        let fft = self.meter.fft_size;
        let fft_ok = fft.is_power_of_two() && (32..=32768).contains(&fft);
        let interval_ok = self.meter.frame_interval_ms > 0;
        let tone_ok = self.tone.frequency_hz > 0.0
            && self.tone.frequency_hz < 20_000.0
            && self.tone.duration_ms > 0
            && (0.0..=1.0).contains(&self.tone.gain);
        fft_ok && interval_ok && tone_ok
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Default settings file inside a config directory
pub fn default_settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILENAME)
}

/// Settings path from `DEVICE_CHECKER_SETTINGS`, if set and non-empty
pub fn settings_path_from_env() -> Option<PathBuf> {
    std::env::var_os(SETTINGS_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist. Invalid values
/// are rejected.
pub fn load_settings(path: &Path) -> Result<CheckerSettings> {
    if !path.exists() {
        log_info!(
            "settings",
            "defaults_used",
            format!("No settings at {:?}, using defaults", path)
        );
        return Ok(CheckerSettings::default());
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;

    let settings: CheckerSettings =
        serde_json::from_str(&json).context("Failed to parse device checker settings")?;

    if !settings.is_valid() {
        anyhow::bail!("Settings out of range in {:?}: {:?}", path, settings);
    }

    log_info_details!(
        "settings",
        "loaded",
        serde_json::json!({ "path": path.display().to_string(), "version": settings.version })
    );
    Ok(settings)
}

/// Save settings to disk
///
/// Creates the parent directory if it doesn't exist.
pub fn save_settings(path: &Path, settings: &CheckerSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create settings directory: {:?}", dir))?;
        }
    }

    let json = serde_json::to_string_pretty(settings)
        .context("Failed to serialize device checker settings")?;

    std::fs::write(path, json)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    log_info!("settings", "saved", format!("Saved settings to {:?}", path));
    Ok(())
}
