//! Per-frame energy smoothing and the pre-roll ring buffer.

use crate::defaults;
use std::collections::VecDeque;

/// Mean absolute amplitude of a PCM16 frame.
///
/// This is the energy measure the whole detection path works in: the noise
/// baseline, the adaptive threshold, and the smoothed level all use the same
/// units, so they compare directly.
pub fn frame_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64).abs()).sum();
    (sum / samples.len() as f64) as f32
}

/// Tracks smoothed energy over a sliding window and keeps a ring of the most
/// recent raw frames for pre-roll seeding.
///
/// The ring is updated on every frame regardless of detection state, so the
/// audio just before a speech onset is always available to prepend.
pub struct EnergyTracker {
    window: VecDeque<f32>,
    window_size: usize,
    ring: VecDeque<Vec<i16>>,
    ring_size: usize,
}

impl EnergyTracker {
    /// Creates a tracker with the given pre-roll capacity in frames.
    pub fn new(pre_roll_frames: usize) -> Self {
        Self::with_window(pre_roll_frames, defaults::ENERGY_SMOOTHING_WINDOW)
    }

    /// Creates a tracker with an explicit smoothing window size.
    pub fn with_window(pre_roll_frames: usize, window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            ring: VecDeque::with_capacity(pre_roll_frames),
            ring_size: pre_roll_frames,
        }
    }

    /// Folds a frame's energy into the sliding window and returns the
    /// smoothed (mean) energy.
    pub fn smooth(&mut self, energy: f32) -> f32 {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(energy);
        let sum: f32 = self.window.iter().sum();
        sum / self.window.len() as f32
    }

    /// Pushes a raw frame into the pre-roll ring, evicting the oldest.
    ///
    /// Call this *after* the frame has been through the detection step: the
    /// ring must reflect the state immediately before the current frame when
    /// a segment is seeded.
    pub fn remember(&mut self, frame: Vec<i16>) {
        if self.ring_size == 0 {
            return;
        }
        if self.ring.len() == self.ring_size {
            self.ring.pop_front();
        }
        self.ring.push_back(frame);
    }

    /// Iterates the buffered pre-roll frames, oldest first.
    pub fn pre_roll(&self) -> impl Iterator<Item = &[i16]> {
        self.ring.iter().map(|frame| frame.as_slice())
    }

    /// Number of frames currently buffered for pre-roll.
    pub fn pre_roll_len(&self) -> usize {
        self.ring.len()
    }

    /// Number of energies currently in the smoothing window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}
