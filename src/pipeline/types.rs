//! Data types flowing through the capture/consumer pipeline.

use std::time::Instant;

/// A frame of raw audio samples with its capture time.
///
/// Ephemeral: frames live for one detection step, plus the pre-roll ring and
/// the active segment buffer.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
    /// Timestamp when this frame was captured.
    pub captured_at: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, captured_at: Instant) -> Self {
        Self {
            samples,
            captured_at,
        }
    }
}

/// A bounded utterance cut from the live stream, ready for transcription.
///
/// Ownership moves through the segment channel to the consumer, which drops
/// the samples as soon as text has been produced.
#[derive(Debug)]
pub struct SpeechSegment {
    /// Pre-roll plus live samples, in capture order.
    pub samples: Vec<i16>,
    /// Sample rate of the samples.
    pub sample_rate: u32,
    /// When the utterance started.
    pub started_at: Instant,
    /// Strictly increasing within a session.
    pub sequence: u64,
}

/// A smoothed energy level for visualization. Droppable under load.
#[derive(Debug, Clone, Copy)]
pub struct EnergyReading {
    /// Smoothed mean-absolute PCM energy.
    pub level: f32,
    /// When the underlying frame was captured.
    pub at: Instant,
}
