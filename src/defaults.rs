//! Default configuration constants for sotto.
//!
//! Shared constants used across configuration types and the pipeline, kept in
//! one place to eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational cost for voice applications.
pub const SAMPLE_RATE: u32 = 16_000;

/// Number of samples in one capture frame.
///
/// 1024 samples is 64ms at 16kHz, short enough for responsive detection and
/// long enough for a stable per-frame energy estimate.
pub const FRAME_SIZE: usize = 1024;

/// Number of frames read during microphone calibration (~1.3s at 16kHz).
pub const CALIBRATION_FRAMES: usize = 20;

/// Maximum age of a cached calibration baseline in seconds (24 hours).
pub const CALIBRATION_MAX_AGE_SECS: u64 = 86_400;

/// Number of frame energies averaged into the smoothed energy value.
pub const ENERGY_SMOOTHING_WINDOW: usize = 10;

/// Lower clamp for the adaptive speech threshold, in mean-absolute PCM units.
pub const ADAPTIVE_THRESHOLD_FLOOR: f32 = 300.0;

/// Upper clamp for the adaptive speech threshold, in mean-absolute PCM units.
pub const ADAPTIVE_THRESHOLD_CEILING: f32 = 1000.0;

/// Fallback speech threshold used before calibration has produced a baseline.
pub const SILENCE_THRESHOLD: f32 = 500.0;

/// Multiplier applied to the noise baseline to derive the speech threshold.
pub const SPEECH_ENERGY_FACTOR: f32 = 3.0;

/// Silence duration that closes a sentence, in seconds.
///
/// Also the continuity window for joining transcribed fragments into one
/// sentence on the consumer side.
pub const SENTENCE_PAUSE_SECS: f32 = 1.0;

/// Fraction of the speech threshold under which a trailing-off voice counts
/// as a sentence boundary ("energy drop" cut).
pub const SENTENCE_ENERGY_FACTOR: f32 = 0.3;

/// Minimum utterance duration before sentence-boundary cuts apply, in seconds.
pub const MIN_SENTENCE_SECS: f32 = 0.8;

/// Maximum utterance duration before a forced cut, in seconds.
pub const MAX_SENTENCE_SECS: f32 = 10.0;

/// Minimum duration of an ordinary end-of-speech segment, in seconds.
pub const MIN_PHRASE_SECS: f32 = 0.5;

/// Audio kept before a detected speech onset, in seconds.
///
/// Held in a ring buffer while idle and prepended when speech starts, so soft
/// onsets are not clipped from the front of a segment.
pub const PRE_PADDING_SECS: f32 = 0.5;

/// Trailing silence that ends an ordinary utterance, in seconds.
pub const SILENCE_PADDING_SECS: f32 = 0.3;

/// High-pass filter cutoff frequency in Hz, removing low-frequency rumble.
pub const HIGHPASS_CUTOFF_HZ: f32 = 100.0;

/// Length of the leading noise profile used by the spectral gate, in seconds.
pub const NOISE_PROFILE_SECS: f32 = 0.3;

/// Attenuation applied by the spectral gate to bins classified as noise.
pub const NOISE_GATE_REDUCTION: f32 = 0.75;

/// Consumer poll timeout on the segment channel, in milliseconds.
///
/// Short enough to interleave energy-channel draining, the sentence timeout
/// flush, and shutdown checks without starving any of them.
pub const SEGMENT_POLL_MS: u64 = 200;

/// Capture-thread sleep between polls when no full frame is ready yet.
pub const CAPTURE_POLL_MS: u64 = 4;

/// Bound on the energy channel; readings beyond it are dropped.
pub const ENERGY_CHANNEL_CAPACITY: usize = 64;

/// Default language code passed to the transcriber.
pub const DEFAULT_LANGUAGE: &str = "en";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_roll_frame_counts_are_nonzero_at_defaults() {
        let pre = (PRE_PADDING_SECS * SAMPLE_RATE as f32 / FRAME_SIZE as f32) as usize;
        let pad = (SILENCE_PADDING_SECS * SAMPLE_RATE as f32 / FRAME_SIZE as f32) as usize;
        let phrase = (MIN_PHRASE_SECS * SAMPLE_RATE as f32 / FRAME_SIZE as f32) as usize;
        assert!(pre >= 1);
        assert!(pad >= 1);
        assert!(phrase >= 1);
    }

    #[test]
    fn adaptive_threshold_clamp_bounds_are_ordered() {
        assert!(ADAPTIVE_THRESHOLD_FLOOR < ADAPTIVE_THRESHOLD_CEILING);
        assert!(SILENCE_THRESHOLD >= ADAPTIVE_THRESHOLD_FLOOR);
        assert!(SILENCE_THRESHOLD <= ADAPTIVE_THRESHOLD_CEILING);
    }
}
