//! Microphone calibration: noise-floor baseline and adaptive threshold.
//!
//! A session starts by establishing the noise floor of the current device,
//! either from a cached baseline or by sampling roughly a second of ambient
//! audio. The speech threshold is derived from that baseline so detection
//! adapts to device- and room-dependent levels.

use crate::audio::source::AudioSource;
use crate::config::{ConfigStore, Settings};
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::vad::energy::frame_energy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// A measured (or cached) noise-floor baseline tied to a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    /// Mean ambient energy in mean-absolute PCM units; always > 0.
    pub baseline_energy: f32,
    /// Unix timestamp (seconds) of the measurement.
    pub captured_at: u64,
    /// Device the baseline was measured on; None = system default.
    pub device: Option<usize>,
}

impl CalibrationProfile {
    /// Rebuild a profile from persisted calibration settings, if present.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings.calibration.energy.map(|energy| Self {
            baseline_energy: energy,
            captured_at: settings.calibration.timestamp,
            device: settings.calibration.device_index,
        })
    }

    /// A cached profile is only trusted for the device it was measured on,
    /// and only for 24 hours.
    pub fn is_valid_for(&self, device: Option<usize>, now_secs: u64) -> bool {
        if self.device != device {
            return false;
        }
        if self.baseline_energy <= 0.0 {
            return false;
        }
        now_secs.saturating_sub(self.captured_at) <= defaults::CALIBRATION_MAX_AGE_SECS
    }

    /// Derive the speech threshold: baseline scaled by the configured factor,
    /// clamped to a range that stays usable on very quiet or very hot mics.
    pub fn adaptive_threshold(&self, speech_energy_factor: f32) -> f32 {
        (self.baseline_energy * speech_energy_factor).clamp(
            defaults::ADAPTIVE_THRESHOLD_FLOOR,
            defaults::ADAPTIVE_THRESHOLD_CEILING,
        )
    }
}

/// Establishes the session's calibration profile.
pub struct Calibrator {
    frames: usize,
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            frames: defaults::CALIBRATION_FRAMES,
        }
    }

    /// Use a non-default number of calibration frames.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames.max(1);
        self
    }

    /// Produce a valid profile for the current device.
    ///
    /// Reuses the cached baseline from the settings snapshot when it matches
    /// the device and is fresh; otherwise measures a new baseline from the
    /// source, writes it into the working settings, and asks the store to
    /// persist it.
    ///
    /// # Errors
    /// - `CalibrationInterrupted` if `running` is cleared mid-measurement
    /// - `Capture` if the source fails while measuring
    pub fn run(
        &self,
        source: &mut dyn AudioSource,
        settings: &mut Settings,
        store: &dyn ConfigStore,
        running: &AtomicBool,
    ) -> Result<CalibrationProfile> {
        let device = settings.audio.input_device_index;
        let now_secs = unix_now();

        if let Some(cached) = CalibrationProfile::from_settings(settings) {
            if cached.is_valid_for(device, now_secs) {
                info!(
                    baseline = cached.baseline_energy,
                    device = %SottoError::device_label(device),
                    "using cached calibration"
                );
                return Ok(cached);
            }
            if cached.device != device {
                info!(
                    cached = %SottoError::device_label(cached.device),
                    current = %SottoError::device_label(device),
                    "input device changed, forcing recalibration"
                );
            }
        }

        info!(
            device = %SottoError::device_label(device),
            "calibrating microphone (establishing noise baseline)"
        );
        let baseline = self.measure_baseline(source, device, running)?;
        let profile = CalibrationProfile {
            baseline_energy: baseline,
            captured_at: now_secs,
            device,
        };
        info!(baseline = profile.baseline_energy, "new baseline energy");

        settings.calibration.energy = Some(profile.baseline_energy);
        settings.calibration.timestamp = profile.captured_at;
        settings.calibration.device_index = device;
        if let Err(e) = store.save(settings) {
            // The session can still run on the fresh in-memory baseline.
            warn!(error = %e, "failed to persist calibration");
        }

        Ok(profile)
    }

    fn measure_baseline(
        &self,
        source: &mut dyn AudioSource,
        device: Option<usize>,
        running: &AtomicBool,
    ) -> Result<f32> {
        let mut energies = Vec::with_capacity(self.frames);

        while energies.len() < self.frames {
            if !running.load(Ordering::SeqCst) {
                return Err(SottoError::CalibrationInterrupted);
            }
            match source.read_frame().map_err(|e| SottoError::Capture {
                device: SottoError::device_label(device),
                message: format!("calibration read failed: {e}"),
            })? {
                Some(frame) => energies.push(frame_energy(&frame)),
                None => {
                    std::thread::sleep(Duration::from_millis(defaults::CAPTURE_POLL_MS));
                }
            }
        }

        let mean = energies.iter().sum::<f32>() / energies.len() as f32;
        // Digital silence must still yield a strictly positive baseline.
        Ok(mean.max(1.0))
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
