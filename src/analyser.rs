//! Level analysis over a live capture stream
//!
//! Mirrors an analyser node: the latest time-domain window is quantised
//! to unsigned bytes centred on 128, and the meter level is the peak
//! absolute deviation from that midpoint, normalised to [0, 1].

use std::sync::Arc;

use crate::errors::MediaError;
use crate::model::METER_MAX;
use crate::platform::MediaStream;

/// Byte value of a zero sample
const MIDPOINT: f32 = 128.0;

/// Quantise one sample the way a byte time-domain read does
pub fn sample_to_byte(sample: f32) -> u8 {
    (MIDPOINT * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8
}

/// Peak absolute deviation from the midpoint, in [0, 1]
pub fn peak_level(bytes: &[u8]) -> f32 {
    let mut peak = 0.0f32;
    for &b in bytes {
        let magnitude = ((b as f32 - MIDPOINT) / MIDPOINT).abs();
        if magnitude > peak {
            peak = magnitude;
        }
    }
    peak.min(METER_MAX)
}

/// Analysis graph attached to a capture stream
pub struct LevelAnalyser {
    source: Option<Arc<dyn MediaStream>>,
    samples: Vec<f32>,
    bytes: Vec<u8>,
}

impl LevelAnalyser {
    /// Connect an analyser with the given FFT size; the time-domain
    /// window is half of it.
    pub fn connect(stream: Arc<dyn MediaStream>, fft_size: usize) -> Result<Self, MediaError> {
        if !stream.has_audio() {
            return Err(MediaError::not_found("Capture stream has no audio track"));
        }
        let window = (fft_size / 2).max(1);
        Ok(Self {
            source: Some(stream),
            samples: vec![0.0; window],
            bytes: vec![sample_to_byte(0.0); window],
        })
    }

    pub fn window_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Refresh the byte time-domain buffer from the source
    pub fn read_byte_time_domain(&mut self) -> &[u8] {
        self.samples.fill(0.0);
        if let Some(source) = &self.source {
            source.read_time_domain(&mut self.samples);
        }
        for (b, s) in self.bytes.iter_mut().zip(self.samples.iter()) {
            *b = sample_to_byte(*s);
        }
        &self.bytes
    }

    /// Sample the current peak level
    pub fn sample_peak(&mut self) -> f32 {
        let bytes = self.read_byte_time_domain();
        peak_level(bytes)
    }

    /// Detach from the source stream
    pub fn disconnect(&mut self) {
        self.source = None;
    }
}
