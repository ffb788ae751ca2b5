//! Device check harness
//!
//! Runs the device checker dialog against the native audio backend:
//! opens the dialog, lists devices, meters the microphone, plays the test
//! tone and saves. Embedder events are printed to stdout as JSON lines;
//! structured logs go to stderr.
//!
//! # Usage
//! ```bash
//! cargo run --bin device_check -- --list
//! cargo run --bin device_check -- --input "USB Headset" --mic-secs 5
//! cargo run --bin device_check -- --output "External Speakers" --no-tone
//! ```

use anyhow::{anyhow, Context, Result};
use device_checker_lib::cpal_platform::{CpalPlatform, CpalSpeakerSink};
use device_checker_lib::dialog::{DeviceCheckerDialog, DialogEvent, DialogSinks};
use device_checker_lib::media_devices::DeviceSessionManager;
use device_checker_lib::model::DeviceKind;
use device_checker_lib::platform::AudioSink;
use device_checker_lib::settings::{
    default_settings_path, load_settings, settings_path_from_env,
};
use device_checker_lib::{log_info, log_info_details, log_warn};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const COMPONENT: &str = "device_check";

/// Interval between printed microphone levels
const LEVEL_REPORT_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct CheckConfig {
    settings_path: Option<PathBuf>,
    input: Option<String>,
    output: Option<String>,
    mic_secs: u64,
    play_tone: bool,
    list_only: bool,
}

impl CheckConfig {
    fn parse() -> Result<Self> {
        let mut settings_path: Option<PathBuf> = None;
        let mut input: Option<String> = None;
        let mut output: Option<String> = None;
        let mut mic_secs = 3;
        let mut play_tone = true;
        let mut list_only = false;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--settings requires a value"))?;
                    settings_path = Some(PathBuf::from(value));
                }
                "--input" => {
                    input = Some(args.next().ok_or_else(|| anyhow!("--input requires a value"))?);
                }
                "--output" => {
                    output = Some(args.next().ok_or_else(|| anyhow!("--output requires a value"))?);
                }
                "--mic-secs" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--mic-secs requires a value"))?;
                    mic_secs = value.parse::<u64>().context("Failed to parse --mic-secs")?;
                }
                "--no-tone" => play_tone = false,
                "--list" => list_only = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => {
                    return Err(anyhow!("Unknown argument: {}", other));
                }
            }
        }

        Ok(Self {
            settings_path,
            input,
            output,
            mic_secs,
            play_tone,
            list_only,
        })
    }
}

/// End of the microphone metering window; `None` when it lies beyond the
/// clock's range
fn mic_deadline(now: Instant, secs: u64) -> Option<Instant> {
    now.checked_add(Duration::from_secs(secs))
}

fn print_usage() {
    println!(
        r#"device_check - Audio device checker harness

USAGE:
    cargo run --bin device_check -- [OPTIONS]

OPTIONS:
    --settings <path>   Settings file (default: $DEVICE_CHECKER_SETTINGS or ./device_checker.json)
    --input <name>      Microphone to test (default: system default)
    --output <name>     Speaker for the test tone (default: system default)
    --mic-secs <secs>   Microphone metering duration, 0 to skip (default: 3)
    --no-tone           Skip the speaker test tone
    --list              List devices and exit
"#
    );
}

/// Print pending embedder events as JSON lines
fn drain_events(rx: &mut mpsc::UnboundedReceiver<DialogEvent>) -> Result<()> {
    while let Ok(event) = rx.try_recv() {
        let line = serde_json::to_string(&event).context("Failed to serialize dialog event")?;
        println!("{}", line);
    }
    Ok(())
}

fn print_devices(dialog: &DeviceCheckerDialog) {
    for kind in [DeviceKind::AudioInput, DeviceKind::AudioOutput] {
        for (id, label) in dialog.device_options(kind) {
            println!(
                "{}",
                serde_json::json!({ "kind": kind, "deviceId": id, "label": label })
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = CheckConfig::parse()?;
    let settings_path = config
        .settings_path
        .clone()
        .or_else(settings_path_from_env)
        .unwrap_or_else(|| default_settings_path(&PathBuf::from(".")));
    let settings = load_settings(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    let tone_duration = Duration::from_millis(settings.tone.duration_ms);

    let platform = Arc::new(CpalPlatform::new());
    let manager = DeviceSessionManager::new(platform, settings);
    let speaker: Arc<dyn AudioSink> = Arc::new(CpalSpeakerSink::new());
    let sinks = DialogSinks {
        video: None,
        audio: Some(speaker),
    };
    let (mut dialog, mut events) = DeviceCheckerDialog::new(manager, sinks);

    dialog.set_visible(true).await;
    print_devices(&dialog);
    if let Some(error) = dialog.error() {
        log_warn!(COMPONENT, "dialog_error", error);
    }

    if config.list_only {
        dialog.close();
        return drain_events(&mut events);
    }

    if let Some(input) = &config.input {
        dialog.on_audio_input_change(input);
    }
    if let Some(output) = &config.output {
        dialog.on_audio_output_change(output);
    }

    if config.mic_secs > 0 {
        dialog.start_mic().await;
        let deadline = mic_deadline(Instant::now(), config.mic_secs);
        let mut peak = 0.0f32;
        while deadline.map_or(true, |deadline| Instant::now() < deadline) {
            if !dialog.is_mic_testing() {
                break;
            }
            tokio::time::sleep(LEVEL_REPORT_INTERVAL).await;
            let level = dialog.mic_level();
            peak = peak.max(level);
            log_info_details!(COMPONENT, "mic_level", serde_json::json!({ "level": level }));
        }
        dialog.stop_mic();
        log_info!(COMPONENT, "mic_test_done", format!("peak level {:.3}", peak));
    }

    if config.play_tone {
        dialog.test_speaker().await;
        tokio::time::sleep(tone_duration + Duration::from_millis(100)).await;
    }

    if let Some(error) = dialog.error() {
        log_warn!(COMPONENT, "dialog_error", error);
    }

    dialog.save_and_close();
    drain_events(&mut events)
}
