//! Session orchestration: one capture thread, one consumer thread, and the
//! channels between them.

use crate::audio::source::AudioHost;
use crate::config::{ConfigStore, Settings};
use crate::defaults;
use crate::error::{Result, SottoError};
use crate::pipeline::capture::CaptureWorker;
use crate::pipeline::consumer::{ConsumerConfig, TranscriptionConsumer};
use crate::pipeline::sink::{EnergySink, TextSink};
use crate::stt::transcriber::Transcriber;
use crossbeam_channel::{bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::info;

/// Handle to a running session.
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    capture: Option<JoinHandle<Result<()>>>,
    consumer: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Request shutdown and wait for both threads.
    ///
    /// Returns the capture thread's outcome; an in-flight transcription is
    /// allowed to finish and the consumer drains its channel before exiting.
    pub fn stop(mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.join_threads()
    }

    /// Wait for the session to end on its own (capture error or an external
    /// clear of the running flag), then collect the outcome.
    pub fn wait(mut self) -> Result<()> {
        let capture_result = match self.capture.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(SottoError::Other("capture thread panicked".to_string()))),
            None => Ok(()),
        };
        // Capture is done; release the consumer.
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.consumer.take()
            && handle.join().is_err()
        {
            return Err(SottoError::Other("consumer thread panicked".to_string()));
        }
        capture_result
    }

    /// True until shutdown is requested or the capture thread gives up.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn join_threads(&mut self) -> Result<()> {
        let capture_result = match self.capture.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(SottoError::Other("capture thread panicked".to_string()))),
            None => Ok(()),
        };
        if let Some(handle) = self.consumer.take()
            && handle.join().is_err()
        {
            return Err(SottoError::Other("consumer thread panicked".to_string()));
        }
        capture_result
    }
}

/// A configured dictation session, ready to start.
///
/// Settings enter as an immutable snapshot: the session works on its own
/// copy, and a reconfiguration means stopping this session and starting a
/// fresh one.
pub struct Session {
    settings: Settings,
    host: Arc<dyn AudioHost>,
    store: Arc<dyn ConfigStore>,
}

impl Session {
    pub fn new(settings: Settings, host: Arc<dyn AudioHost>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            settings,
            host,
            store,
        }
    }

    /// Spawn the capture and consumer threads.
    ///
    /// Capture failures clear the running flag so the consumer drains and
    /// stops; the error itself is surfaced by [`SessionHandle::stop`] or
    /// [`SessionHandle::wait`].
    pub fn start<T, S, E>(
        self,
        transcriber: T,
        text_sink: S,
        energy_sink: E,
    ) -> Result<SessionHandle>
    where
        T: Transcriber + 'static,
        S: TextSink,
        E: EnergySink,
    {
        self.settings.validate()?;

        let running = Arc::new(AtomicBool::new(true));
        let (segment_tx, segment_rx) = unbounded();
        let (energy_tx, energy_rx) = bounded(defaults::ENERGY_CHANNEL_CAPACITY);

        let consumer_config = ConsumerConfig::from_settings(&self.settings);
        let worker = CaptureWorker::new(self.host, self.settings, self.store);

        let capture_running = Arc::clone(&running);
        let capture = thread::Builder::new()
            .name("sotto-capture".to_string())
            .spawn(move || {
                let result = worker.run(segment_tx, energy_tx, &capture_running);
                // However capture ends, let the consumer wind down.
                capture_running.store(false, Ordering::SeqCst);
                result
            })?;

        let consumer_running = Arc::clone(&running);
        let consumer = thread::Builder::new()
            .name("sotto-consumer".to_string())
            .spawn(move || {
                let mut text_sink = text_sink;
                TranscriptionConsumer::new(transcriber, consumer_config).run(
                    segment_rx,
                    energy_rx,
                    &mut text_sink,
                    &energy_sink,
                    &consumer_running,
                );
            })?;

        info!("session started");
        Ok(SessionHandle {
            running,
            capture: Some(capture),
            consumer: Some(consumer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{MockAudioHost, MockAudioSource};
    use crate::config::MemoryConfigStore;
    use crate::pipeline::sink::{CollectorSink, NullEnergySink};
    use crate::stt::transcriber::MockTranscriber;

    #[test]
    fn test_invalid_settings_refuse_to_start() {
        let mut settings = Settings::default();
        settings.audio.sample_rate = 0;

        let session = Session::new(
            settings,
            Arc::new(MockAudioHost::new(MockAudioSource::new())),
            Arc::new(MemoryConfigStore::new()),
        );
        let result = session.start(
            MockTranscriber::new(""),
            CollectorSink::new(),
            NullEnergySink,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_stop_on_quiet_session_is_clean() {
        let mut settings = Settings::default();
        settings.calibration.energy = Some(200.0);
        settings.calibration.timestamp = crate::vad::calibrator::unix_now();

        let session = Session::new(
            settings,
            Arc::new(MockAudioHost::new(MockAudioSource::new())),
            Arc::new(MemoryConfigStore::new()),
        );
        let handle = session
            .start(
                MockTranscriber::new(""),
                CollectorSink::new(),
                NullEnergySink,
            )
            .unwrap();

        assert!(handle.is_running());
        std::thread::sleep(std::time::Duration::from_millis(50));
        handle.stop().unwrap();
    }
}
