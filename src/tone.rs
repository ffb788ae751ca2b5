//! Test tone synthesis graph (oscillator -> gain -> sink)

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::settings::ToneSettings;

/// Sine oscillator with a fixed gain stage
///
/// Sinks pull samples through [`ToneGraph::render`] from their audio
/// callback; the manager drives `start`/`stop`/`close`.
pub struct ToneGraph {
    frequency_hz: f32,
    gain: f32,
    started: AtomicBool,
    stopped: AtomicBool,
    closed: AtomicBool,
    /// Oscillator phase in cycles [0, 1)
    phase: Mutex<f64>,
}

impl ToneGraph {
    pub fn new(settings: &ToneSettings) -> Self {
        Self {
            frequency_hz: settings.frequency_hz,
            gain: settings.gain,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            phase: Mutex::new(0.0),
        }
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Start the oscillator; a stopped oscillator cannot restart
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Release the graph; implies stop
    pub fn close(&self) {
        self.stop();
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_sounding(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Fill an interleaved buffer. Silence unless sounding.
    ///
    /// Never blocks: if the phase is contended the block is rendered silent.
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: u32) {
        let channels = channels.max(1);
        if !self.is_sounding() || sample_rate == 0 {
            out.fill(0.0);
            return;
        }
        let mut phase = match self.phase.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                out.fill(0.0);
                return;
            }
        };

        let step = self.frequency_hz as f64 / sample_rate as f64;
        for frame in out.chunks_mut(channels) {
            let value = ((*phase * TAU).sin() as f32) * self.gain;
            frame.fill(value);
            *phase = (*phase + step).fract();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ToneGraph {
        ToneGraph::new(&ToneSettings::default())
    }

    #[test]
    fn test_silent_before_start() {
        let tone = graph();
        let mut buf = vec![1.0f32; 256];
        tone.render(&mut buf, 2, 48000);
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_sounding_amplitude_bounded_by_gain() {
        let tone = graph();
        tone.start();
        let mut buf = vec![0.0f32; 44100];
        tone.render(&mut buf, 1, 44100);

        let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= tone.gain() + 1e-6);
        assert!(peak > tone.gain() * 0.99, "peak {} should reach gain", peak);
    }

    #[test]
    fn test_channels_carry_same_sample() {
        let tone = graph();
        tone.start();
        let mut buf = vec![0.0f32; 64];
        tone.render(&mut buf, 2, 48000);
        for frame in buf.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_stop_and_close_silence() {
        let tone = graph();
        tone.start();
        assert!(tone.is_sounding());

        tone.stop();
        assert!(!tone.is_sounding());
        let mut buf = vec![1.0f32; 32];
        tone.render(&mut buf, 1, 48000);
        assert!(buf.iter().all(|s| *s == 0.0));

        // a stopped oscillator stays stopped
        tone.start();
        assert!(!tone.is_sounding());

        tone.close();
        assert!(tone.is_closed());
    }

    #[test]
    fn test_zero_crossings_match_frequency() {
        let tone = graph();
        tone.start();
        let rate = 48000;
        let mut buf = vec![0.0f32; rate as usize];
        tone.render(&mut buf, 1, rate);

        let crossings = buf
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count() as f32;
        assert!((crossings - 440.0).abs() <= 2.0, "got {} cycles", crossings);
    }
}
