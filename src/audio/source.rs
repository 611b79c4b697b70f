//! Audio source and device enumeration traits.

use crate::defaults;
use crate::error::{Result, SottoError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A microphone-like source yielding fixed-size PCM16 mono frames.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the next frame without blocking.
    ///
    /// # Returns
    /// `Ok(Some(frame))` when a full frame is available, `Ok(None)` when the
    /// caller should poll again shortly, or an error when the stream is gone.
    fn read_frame(&mut self) -> Result<Option<Vec<i16>>>;

    /// Sample rate of the frames this source yields.
    fn sample_rate(&self) -> u32;
}

/// Opens audio sources by device index and enumerates what is available.
///
/// `None` denotes the system default device. The index space is the position
/// in the list returned by [`AudioHost::devices`].
pub trait AudioHost: Send + Sync {
    /// Names of the available input devices, in index order.
    fn devices(&self) -> Result<Vec<String>>;

    /// Open a source on the given device, or the system default for `None`.
    fn open(&self, device: Option<usize>) -> Result<Box<dyn AudioSource>>;
}

/// What a [`MockAudioSource`] does once its scripted frames run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedBehavior {
    /// Keep yielding silent frames forever (default).
    Silence,
    /// Yield `Ok(None)` as if the device produced no more data yet.
    Starve,
    /// Fail the read.
    Fail,
}

/// Scriptable audio source for tests.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    frames: VecDeque<Vec<i16>>,
    exhausted: ExhaustedBehavior,
    sample_rate: u32,
    started: bool,
    should_fail_start: bool,
    error_message: String,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            exhausted: ExhaustedBehavior::Silence,
            sample_rate: defaults::SAMPLE_RATE,
            started: false,
            should_fail_start: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Queue frames to be returned in order.
    pub fn with_frames(mut self, frames: Vec<Vec<i16>>) -> Self {
        self.frames.extend(frames);
        self
    }

    /// Configure what happens after the scripted frames run out.
    pub fn when_exhausted(mut self, behavior: ExhaustedBehavior) -> Self {
        self.exhausted = behavior;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(SottoError::Capture {
                device: "mock".to_string(),
                message: self.error_message.clone(),
            })
        } else {
            self.started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        match self.exhausted {
            ExhaustedBehavior::Silence => Ok(Some(vec![0i16; defaults::FRAME_SIZE])),
            ExhaustedBehavior::Starve => Ok(None),
            ExhaustedBehavior::Fail => Err(SottoError::Capture {
                device: "mock".to_string(),
                message: self.error_message.clone(),
            }),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Mock device registry for tests.
///
/// Opens clones of a template source and records every open request so tests
/// can assert on fallback behavior.
pub struct MockAudioHost {
    device_names: Vec<String>,
    template: MockAudioSource,
    failing_indices: Vec<usize>,
    opens: Mutex<Vec<Option<usize>>>,
}

impl MockAudioHost {
    pub fn new(template: MockAudioSource) -> Self {
        Self {
            device_names: vec!["Mock Microphone".to_string()],
            template,
            failing_indices: Vec::new(),
            opens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_devices(mut self, names: Vec<String>) -> Self {
        self.device_names = names;
        self
    }

    /// Make opening the given index fail with DeviceNotFound.
    pub fn with_failing_index(mut self, index: usize) -> Self {
        self.failing_indices.push(index);
        self
    }

    /// Every device requested via [`AudioHost::open`], in order.
    pub fn open_requests(&self) -> Vec<Option<usize>> {
        self.opens.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl AudioHost for MockAudioHost {
    fn devices(&self) -> Result<Vec<String>> {
        Ok(self.device_names.clone())
    }

    fn open(&self, device: Option<usize>) -> Result<Box<dyn AudioSource>> {
        if let Ok(mut log) = self.opens.lock() {
            log.push(device);
        }
        if let Some(index) = device
            && self.failing_indices.contains(&index)
        {
            return Err(SottoError::DeviceNotFound {
                device: SottoError::device_label(device),
            });
        }
        Ok(Box::new(self.template.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_yields_scripted_frames_in_order() {
        let mut source =
            MockAudioSource::new().with_frames(vec![vec![1i16; 4], vec![2i16; 4]]);

        assert_eq!(source.read_frame().unwrap().unwrap(), vec![1i16; 4]);
        assert_eq!(source.read_frame().unwrap().unwrap(), vec![2i16; 4]);
    }

    #[test]
    fn test_mock_source_silence_after_exhaustion() {
        let mut source = MockAudioSource::new().with_frames(vec![vec![5i16; 4]]);
        source.read_frame().unwrap();

        let frame = source.read_frame().unwrap().unwrap();
        assert_eq!(frame.len(), defaults::FRAME_SIZE);
        assert!(frame.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_mock_source_starve_after_exhaustion() {
        let mut source = MockAudioSource::new().when_exhausted(ExhaustedBehavior::Starve);
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_mock_source_fail_after_exhaustion() {
        let mut source = MockAudioSource::new()
            .when_exhausted(ExhaustedBehavior::Fail)
            .with_error_message("stream died");

        match source.read_frame() {
            Err(SottoError::Capture { message, .. }) => assert_eq!(message, "stream died"),
            other => panic!("Expected Capture error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_mock_source_start_stop_state() {
        let mut source = MockAudioSource::new();
        assert!(!source.is_started());
        source.start().unwrap();
        assert!(source.is_started());
        source.stop().unwrap();
        assert!(!source.is_started());
    }

    #[test]
    fn test_mock_source_start_failure() {
        let mut source = MockAudioSource::new().with_start_failure();
        assert!(source.start().is_err());
        assert!(!source.is_started());
    }

    #[test]
    fn test_mock_host_records_open_requests() {
        let host = MockAudioHost::new(MockAudioSource::new());
        host.open(Some(2)).unwrap();
        host.open(None).unwrap();
        assert_eq!(host.open_requests(), vec![Some(2), None]);
    }

    #[test]
    fn test_mock_host_failing_index() {
        let host = MockAudioHost::new(MockAudioSource::new()).with_failing_index(7);
        assert!(host.open(Some(7)).is_err());
        assert!(host.open(Some(0)).is_ok());
        assert!(host.open(None).is_ok());
    }

    #[test]
    fn test_audio_source_trait_is_object_safe() {
        let mut source: Box<dyn AudioSource> =
            Box::new(MockAudioSource::new().with_frames(vec![vec![9i16; 4]]));
        source.start().unwrap();
        assert_eq!(source.read_frame().unwrap().unwrap(), vec![9i16; 4]);
        source.stop().unwrap();
    }
}
