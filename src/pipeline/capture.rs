//! Capture worker: owns the audio source, calibration, energy tracking, and
//! segmentation for one session.
//!
//! Sole producer onto the segment and energy channels. Never blocks on the
//! consumer: the segment channel is unbounded and energy readings are dropped
//! when their channel is full.

use crate::audio::source::{AudioHost, AudioSource};
use crate::config::{ConfigStore, Settings};
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::pipeline::types::{AudioFrame, EnergyReading, SpeechSegment};
use crate::vad::calibrator::Calibrator;
use crate::vad::energy::{EnergyTracker, frame_energy};
use crate::vad::segmenter::{Segmenter, SegmenterConfig};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Runs the capture side of a session on its own thread.
pub struct CaptureWorker {
    host: Arc<dyn AudioHost>,
    settings: Settings,
    store: Arc<dyn ConfigStore>,
}

impl CaptureWorker {
    /// Create a worker over the session's working settings copy.
    pub fn new(host: Arc<dyn AudioHost>, settings: Settings, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            host,
            settings,
            store,
        }
    }

    /// Open the configured device, calibrate, then capture until `running`
    /// clears or the stream fails.
    ///
    /// A termination request during calibration is a clean abort (`Ok`). A
    /// capture error at any stage aborts the session and surfaces to the
    /// caller; restarting is the caller's decision.
    pub fn run(
        mut self,
        segment_tx: Sender<SpeechSegment>,
        energy_tx: Sender<EnergyReading>,
        running: &AtomicBool,
    ) -> Result<()> {
        let mut source = self.open_with_fallback()?;
        source.start()?;

        let result = self.capture_loop(source.as_mut(), &segment_tx, &energy_tx, running);

        if let Err(e) = source.stop() {
            warn!(stage = "capture", error = %e, "failed to stop audio source");
        }
        info!("microphone deactivated");

        match result {
            Err(SottoError::CalibrationInterrupted) => Ok(()),
            other => other,
        }
    }

    /// Open the configured device, falling back to the system default once.
    ///
    /// The fallback rewrites the working settings (and persists them) so the
    /// cached calibration no longer matches and a recalibration runs.
    fn open_with_fallback(&mut self) -> Result<Box<dyn AudioSource>> {
        let device = self.settings.audio.input_device_index;
        match self.host.open(device) {
            Ok(source) => Ok(source),
            Err(e) if device.is_some() => {
                warn!(
                    device = %SottoError::device_label(device),
                    error = %e,
                    "failed to open configured device, falling back to default"
                );
                self.settings.audio.input_device_index = None;
                if let Err(save_err) = self.store.save(&self.settings) {
                    warn!(error = %save_err, "failed to persist device fallback");
                }
                self.host.open(None)
            }
            Err(e) => Err(e),
        }
    }

    fn capture_loop(
        &mut self,
        source: &mut dyn AudioSource,
        segment_tx: &Sender<SpeechSegment>,
        energy_tx: &Sender<EnergyReading>,
        running: &AtomicBool,
    ) -> Result<()> {
        let profile = Calibrator::new().run(source, &mut self.settings, self.store.as_ref(), running)?;
        let threshold = profile.adaptive_threshold(self.settings.detection.speech_energy_threshold);
        self.settings.detection.silence_threshold = threshold;
        info!(threshold, "adaptive threshold set");

        let device_label = SottoError::device_label(self.settings.audio.input_device_index);
        let sample_rate = source.sample_rate();
        let mut tracker = EnergyTracker::new(self.settings.pre_padding_frames());
        let mut segmenter = Segmenter::new(SegmenterConfig::from_settings(&self.settings, threshold));

        while running.load(Ordering::SeqCst) {
            let frame = match source.read_frame() {
                Ok(Some(samples)) => AudioFrame::new(samples, Instant::now()),
                Ok(None) => {
                    std::thread::sleep(Duration::from_millis(defaults::CAPTURE_POLL_MS));
                    continue;
                }
                Err(e) => {
                    // A read failure aborts the whole session; the partial
                    // utterance is discarded, never flushed.
                    segmenter.reset();
                    error!(
                        device = %device_label,
                        stage = "capture",
                        error = %e,
                        "stream read failed, aborting session"
                    );
                    return Err(e);
                }
            };

            let smoothed = tracker.smooth(frame_energy(&frame.samples));

            // Visualization is best-effort: a full channel drops the reading
            // rather than slowing capture.
            let _ = energy_tx.try_send(EnergyReading {
                level: smoothed,
                at: frame.captured_at,
            });

            if let Some(cut) = segmenter.feed(&frame.samples, smoothed, tracker.pre_roll()) {
                let segment = SpeechSegment {
                    samples: cut.samples,
                    sample_rate,
                    started_at: cut.started_at,
                    sequence: cut.sequence,
                };
                if segment_tx.send(segment).is_err() {
                    // Consumer is gone; nothing left to capture for.
                    break;
                }
            }

            tracker.remember(frame.samples);
        }

        // Shutdown from whichever state we were in: no forced flush.
        segmenter.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{ExhaustedBehavior, MockAudioHost, MockAudioSource};
    use crate::config::MemoryConfigStore;
    use crossbeam_channel::{bounded, unbounded};

    fn quiet_frames(count: usize) -> Vec<Vec<i16>> {
        vec![vec![10i16; defaults::FRAME_SIZE]; count]
    }

    fn run_worker(
        host: MockAudioHost,
        settings: Settings,
    ) -> (
        Result<()>,
        Vec<SpeechSegment>,
        Vec<EnergyReading>,
        Arc<MemoryConfigStore>,
        Arc<MockAudioHost>,
    ) {
        let store = Arc::new(MemoryConfigStore::new());
        let host = Arc::new(host);
        let worker = CaptureWorker::new(host.clone(), settings, store.clone());
        let (segment_tx, segment_rx) = unbounded();
        let (energy_tx, energy_rx) = bounded(defaults::ENERGY_CHANNEL_CAPACITY);
        let running = AtomicBool::new(true);

        let result = worker.run(segment_tx, energy_tx, &running);
        let segments: Vec<SpeechSegment> = segment_rx.try_iter().collect();
        let readings: Vec<EnergyReading> = energy_rx.try_iter().collect();
        (result, segments, readings, store, host)
    }

    fn cached_settings() -> Settings {
        // A fresh cached baseline so the worker skips measurement.
        let mut settings = Settings::default();
        settings.calibration.energy = Some(200.0);
        settings.calibration.timestamp = crate::vad::calibrator::unix_now();
        settings.calibration.device_index = None;
        settings
    }

    #[test]
    fn test_quiet_stream_emits_no_segments() {
        // Cached baseline 200 gives an adaptive threshold of 600; every
        // frame stays far below it.
        let source = MockAudioSource::new()
            .with_frames(quiet_frames(40))
            .when_exhausted(ExhaustedBehavior::Fail);
        let host = MockAudioHost::new(source);

        let (result, segments, readings, _, _) = run_worker(host, cached_settings());

        // The mock eventually fails the read, which ends the session.
        assert!(result.is_err());
        assert!(segments.is_empty(), "no segment may be emitted below threshold");
        assert!(!readings.is_empty(), "energy readings should still flow");
    }

    #[test]
    fn test_speech_then_silence_emits_one_segment() {
        let mut frames = quiet_frames(2);
        frames.extend(vec![vec![2000i16; defaults::FRAME_SIZE]; 12]);
        frames.extend(quiet_frames(30));
        let source = MockAudioSource::new()
            .with_frames(frames)
            .when_exhausted(ExhaustedBehavior::Fail);
        let host = MockAudioHost::new(source);

        let (result, segments, _, _, _) = run_worker(host, cached_settings());

        assert!(result.is_err()); // session ends when the mock fails
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sequence, 0);
        assert_eq!(segments[0].sample_rate, defaults::SAMPLE_RATE);
    }

    #[test]
    fn test_read_error_while_speaking_aborts_session() {
        // Speech starts, then the stream dies: the partial buffer must be
        // discarded and the error surfaced.
        let mut frames = Vec::new();
        frames.extend(vec![vec![2000i16; defaults::FRAME_SIZE]; 5]);
        let source = MockAudioSource::new()
            .with_frames(frames)
            .when_exhausted(ExhaustedBehavior::Fail)
            .with_error_message("usb yanked");
        let host = MockAudioHost::new(source);

        let (result, segments, _, _, _) = run_worker(host, cached_settings());

        match result {
            Err(SottoError::Capture { message, .. }) => assert!(message.contains("usb yanked")),
            other => panic!("Expected Capture error, got {:?}", other.map(|_| ())),
        }
        assert!(segments.is_empty(), "partial utterance must not be flushed");
    }

    #[test]
    fn test_fallback_to_default_device_forces_recalibration() {
        let source = MockAudioSource::new()
            .with_frames(quiet_frames(25))
            .when_exhausted(ExhaustedBehavior::Fail);
        let host = MockAudioHost::new(source).with_failing_index(5);

        let mut settings = cached_settings();
        settings.audio.input_device_index = Some(5);
        settings.calibration.device_index = Some(5);

        let (_, _, _, store, host) = run_worker(host, settings);

        // Opened the configured device, then the default.
        assert_eq!(host.open_requests(), vec![Some(5), None]);

        // The fallback and the recalibration were both persisted.
        let saved = store.last_saved().unwrap();
        assert_eq!(saved.audio.input_device_index, None);
        assert_eq!(saved.calibration.device_index, None);
        assert!(saved.calibration.energy.is_some());
    }

    #[test]
    fn test_open_failure_without_configured_device_is_fatal() {
        struct NoDeviceHost;
        impl AudioHost for NoDeviceHost {
            fn devices(&self) -> Result<Vec<String>> {
                Ok(vec![])
            }
            fn open(&self, device: Option<usize>) -> Result<Box<dyn AudioSource>> {
                Err(SottoError::DeviceNotFound {
                    device: SottoError::device_label(device),
                })
            }
        }

        let worker = CaptureWorker::new(
            Arc::new(NoDeviceHost),
            Settings::default(),
            Arc::new(MemoryConfigStore::new()),
        );
        let (segment_tx, _segment_rx) = unbounded();
        let (energy_tx, _energy_rx) = bounded(8);
        let running = AtomicBool::new(true);

        let result = worker.run(segment_tx, energy_tx, &running);
        assert!(matches!(result, Err(SottoError::DeviceNotFound { .. })));
    }

    #[test]
    fn test_termination_during_calibration_is_clean() {
        let source = MockAudioSource::new().when_exhausted(ExhaustedBehavior::Starve);
        let host = Arc::new(MockAudioHost::new(source));
        let store = Arc::new(MemoryConfigStore::new());
        // No cached calibration: the worker would block measuring frames.
        let worker = CaptureWorker::new(host, Settings::default(), store);
        let (segment_tx, _segment_rx) = unbounded();
        let (energy_tx, _energy_rx) = bounded(8);
        let running = AtomicBool::new(false);

        let result = worker.run(segment_tx, energy_tx, &running);
        assert!(result.is_ok(), "interrupted calibration is a clean abort");
    }
}
