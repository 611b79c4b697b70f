//! Segment preprocessing ahead of transcription.
//!
//! int16 → normalized float32, a rumble-removing high-pass, and optional
//! spectral-gating noise reduction. Stages are best-effort: one that cannot
//! run returns its input unmodified instead of failing the segment.

use crate::defaults;
use crate::error::{Result, SottoError};
use rustfft::{FftPlanner, num_complex::Complex};
use tracing::{debug, warn};

/// STFT frame length for the spectral gate.
const FFT_SIZE: usize = 512;

/// Magnitude margin over the noise profile under which a bin is gated.
const GATE_MARGIN: f32 = 1.5;

/// Convert PCM16 samples to float32 in [-1, 1].
pub fn to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Scale so the peak amplitude lands at 0.9. No-op on silence.
pub fn normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 0.0 {
        let scale = 0.9 / peak;
        for sample in samples.iter_mut() {
            *sample *= scale;
        }
    }
}

/// Second-order Butterworth high-pass biquad.
pub struct HighPassFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl HighPassFilter {
    /// Compute coefficients for the given cutoff.
    ///
    /// # Errors
    /// Fails when the cutoff is outside (0, sample_rate/2) or the math
    /// degenerates to non-finite coefficients.
    pub fn new(cutoff_hz: f32, sample_rate: u32) -> Result<Self> {
        let nyquist = sample_rate as f32 / 2.0;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(SottoError::Filter {
                stage: "highpass",
                message: format!("cutoff {cutoff_hz}Hz outside (0, {nyquist}Hz)"),
            });
        }

        let w0 = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate as f32;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        // Butterworth Q = 1/sqrt(2)
        let q = std::f32::consts::FRAC_1_SQRT_2;
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha;
        let filter = Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        };

        let finite = filter.b0.is_finite()
            && filter.b1.is_finite()
            && filter.b2.is_finite()
            && filter.a1.is_finite()
            && filter.a2.is_finite();
        if !finite {
            return Err(SottoError::Filter {
                stage: "highpass",
                message: "non-finite coefficients".to_string(),
            });
        }
        Ok(filter)
    }

    /// Run the filter over a buffer (direct form II transposed).
    pub fn apply(&self, samples: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(samples.len());
        let mut s1 = 0.0f32;
        let mut s2 = 0.0f32;
        for &x in samples {
            let y = self.b0 * x + s1;
            s1 = self.b1 * x - self.a1 * y + s2;
            s2 = self.b2 * x - self.a2 * y;
            out.push(y);
        }
        out
    }
}

/// Spectral-gating noise reduction.
///
/// The first [`defaults::NOISE_PROFILE_SECS`] of the buffer serve as the
/// noise profile; STFT bins that stay within [`GATE_MARGIN`] of the profile
/// are attenuated by [`defaults::NOISE_GATE_REDUCTION`].
///
/// # Errors
/// Fails when the buffer is too short to carry both a noise profile and
/// gated content; callers keep the input in that case.
pub fn reduce_noise(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    let hop = FFT_SIZE / 2;
    let noise_len = (sample_rate as f32 * defaults::NOISE_PROFILE_SECS) as usize;
    if samples.len() <= noise_len || noise_len < FFT_SIZE {
        return Err(SottoError::Filter {
            stage: "noise-gate",
            message: "buffer too short for a noise profile".to_string(),
        });
    }

    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(FFT_SIZE);
    let inverse = planner.plan_fft_inverse(FFT_SIZE);

    let window: Vec<f32> = (0..FFT_SIZE)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / FFT_SIZE as f32).cos())
        })
        .collect();

    // Mean magnitude per bin over the leading noise-only region.
    let mut noise_mag = vec![0.0f32; FFT_SIZE];
    let mut profile_frames = 0usize;
    let mut pos = 0;
    while pos + FFT_SIZE <= noise_len {
        let mut buf: Vec<Complex<f32>> = samples[pos..pos + FFT_SIZE]
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        forward.process(&mut buf);
        for (mag, bin) in noise_mag.iter_mut().zip(&buf) {
            *mag += bin.norm();
        }
        profile_frames += 1;
        pos += hop;
    }
    if profile_frames == 0 {
        return Err(SottoError::Filter {
            stage: "noise-gate",
            message: "noise profile region shorter than one frame".to_string(),
        });
    }
    for mag in noise_mag.iter_mut() {
        *mag /= profile_frames as f32;
    }

    // Gate every frame at 50% overlap; Hann at this hop overlap-adds to
    // unity, so ungated content reconstructs unchanged.
    let keep = 1.0 - defaults::NOISE_GATE_REDUCTION;
    let mut out = vec![0.0f32; samples.len() + FFT_SIZE];
    pos = 0;
    while pos < samples.len() {
        let mut buf: Vec<Complex<f32>> = (0..FFT_SIZE)
            .map(|i| {
                let s = samples.get(pos + i).copied().unwrap_or(0.0);
                Complex::new(s * window[i], 0.0)
            })
            .collect();
        forward.process(&mut buf);
        for (bin, &profile) in buf.iter_mut().zip(&noise_mag) {
            if bin.norm() < profile * GATE_MARGIN {
                *bin *= keep;
            }
        }
        inverse.process(&mut buf);
        for (i, bin) in buf.iter().enumerate() {
            out[pos + i] += bin.re / FFT_SIZE as f32;
        }
        pos += hop;
    }
    out.truncate(samples.len());
    Ok(out)
}

/// Full preprocessing chain for one segment.
///
/// Never fails: a stage that cannot run leaves the audio as it was.
pub fn preprocess(
    samples: &[i16],
    sample_rate: u32,
    use_noise_reduction: bool,
) -> Vec<f32> {
    let mut audio = to_float(samples);
    normalize(&mut audio);

    match HighPassFilter::new(defaults::HIGHPASS_CUTOFF_HZ, sample_rate) {
        Ok(filter) => audio = filter.apply(&audio),
        Err(e) => warn!(error = %e, "skipping high-pass stage"),
    }

    if use_noise_reduction {
        match reduce_noise(&audio, sample_rate) {
            Ok(cleaned) => audio = cleaned,
            Err(e) => debug!(error = %e, "skipping noise reduction"),
        }
    }

    audio
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_to_float_scales_full_range() {
        let samples = vec![i16::MAX, 0, i16::MIN];
        let floats = to_float(&samples);
        assert!((floats[0] - 0.99997).abs() < 0.001);
        assert_eq!(floats[1], 0.0);
        assert_eq!(floats[2], -1.0);
    }

    #[test]
    fn test_normalize_scales_peak_to_point_nine() {
        let mut samples = vec![0.1, -0.45, 0.3];
        normalize(&mut samples);
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_is_noop_on_silence() {
        let mut samples = vec![0.0f32; 128];
        normalize(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_highpass_removes_dc_offset() {
        let filter = HighPassFilter::new(100.0, 16000).unwrap();
        let dc = vec![0.5f32; 8192];
        let out = filter.apply(&dc);
        // After the transient settles, DC must be gone.
        let tail_mean: f32 = out[4096..].iter().sum::<f32>() / 4096.0;
        assert!(tail_mean.abs() < 0.01, "residual DC: {tail_mean}");
    }

    #[test]
    fn test_highpass_passes_speech_band() {
        let filter = HighPassFilter::new(100.0, 16000).unwrap();
        let tone = sine(1000.0, 0.5, 16000, 8192);
        let out = filter.apply(&tone);
        // 1kHz sits well above the cutoff; most energy survives.
        assert!(rms(&out[1024..]) > 0.8 * rms(&tone[1024..]));
    }

    #[test]
    fn test_highpass_attenuates_rumble() {
        let filter = HighPassFilter::new(100.0, 16000).unwrap();
        let rumble = sine(20.0, 0.5, 16000, 16384);
        let out = filter.apply(&rumble);
        assert!(rms(&out[4096..]) < 0.2 * rms(&rumble[4096..]));
    }

    #[test]
    fn test_highpass_rejects_invalid_cutoff() {
        assert!(HighPassFilter::new(0.0, 16000).is_err());
        assert!(HighPassFilter::new(-10.0, 16000).is_err());
        assert!(HighPassFilter::new(9000.0, 16000).is_err());
    }

    #[test]
    fn test_reduce_noise_rejects_short_buffer() {
        let short = vec![0.0f32; 1000];
        assert!(reduce_noise(&short, 16000).is_err());
    }

    #[test]
    fn test_reduce_noise_preserves_length() {
        let audio = sine(440.0, 0.3, 16000, 16000);
        let out = reduce_noise(&audio, 16000).unwrap();
        assert_eq!(out.len(), audio.len());
    }

    #[test]
    fn test_reduce_noise_attenuates_stationary_noise() {
        let sample_rate = 16000;
        // Constant low-level hum throughout; louder voice-band tone later.
        let mut audio = sine(300.0, 0.02, sample_rate, 16000);
        let voice = sine(1000.0, 0.5, sample_rate, 16000);
        for (a, v) in audio.iter_mut().zip(&voice).skip(8000) {
            *a += v;
        }

        let out = reduce_noise(&audio, sample_rate).unwrap();

        // The hum-only stretch (profile region) should be gated down.
        let noise_in = rms(&audio[1024..4096]);
        let noise_out = rms(&out[1024..4096]);
        assert!(
            noise_out < 0.6 * noise_in,
            "noise not attenuated: {noise_out} vs {noise_in}"
        );

        // The loud tone should survive mostly intact.
        let voice_in = rms(&audio[9000..15000]);
        let voice_out = rms(&out[9000..15000]);
        assert!(
            voice_out > 0.7 * voice_in,
            "voice over-attenuated: {voice_out} vs {voice_in}"
        );
    }

    #[test]
    fn test_preprocess_returns_same_length_finite_audio() {
        let samples: Vec<i16> = (0..8000).map(|i| ((i % 200) * 100) as i16).collect();
        let out = preprocess(&samples, 16000, true);
        assert_eq!(out.len(), samples.len());
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_preprocess_survives_buffer_too_short_for_gate() {
        // Shorter than the noise profile: the gate is skipped, not fatal.
        let samples = vec![500i16; 2048];
        let out = preprocess(&samples, 16000, true);
        assert_eq!(out.len(), 2048);
    }
}
