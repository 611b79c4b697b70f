//! Real audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::source::{AudioHost, AudioSource};
use crate::defaults;
use crate::error::{Result, SottoError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers while
/// probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2
/// (stderr). Safe as long as no other thread is concurrently manipulating
/// fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream lives inside a `CpalFrameSource` that is owned by a
/// single capture thread; its methods are never called concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// State shared with the CPAL data callback.
struct SharedCapture {
    buffer: Mutex<Vec<i16>>,
    failure: Mutex<Option<String>>,
}

/// Device registry backed by the default CPAL host.
///
/// Device indices are positions in the list returned by [`AudioHost::devices`];
/// `None` opens the system default input device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalAudioHost;

impl CpalAudioHost {
    pub fn new() -> Self {
        Self
    }
}

impl AudioHost for CpalAudioHost {
    fn devices(&self) -> Result<Vec<String>> {
        with_suppressed_stderr(|| {
            let host = cpal::default_host();
            let devices = host.input_devices().map_err(|e| SottoError::Capture {
                device: "host".to_string(),
                message: format!("failed to enumerate input devices: {e}"),
            })?;

            Ok(devices
                .enumerate()
                .map(|(index, device)| {
                    device.name().unwrap_or_else(|_| format!("device #{index}"))
                })
                .collect())
        })
    }

    fn open(&self, device: Option<usize>) -> Result<Box<dyn AudioSource>> {
        let label = SottoError::device_label(device);
        let cpal_device = with_suppressed_stderr(|| -> Result<cpal::Device> {
            let host = cpal::default_host();
            match device {
                Some(index) => {
                    let mut devices =
                        host.input_devices().map_err(|e| SottoError::Capture {
                            device: label.clone(),
                            message: format!("failed to enumerate input devices: {e}"),
                        })?;
                    devices
                        .nth(index)
                        .ok_or_else(|| SottoError::DeviceNotFound {
                            device: label.clone(),
                        })
                }
                None => host
                    .default_input_device()
                    .ok_or_else(|| SottoError::DeviceNotFound {
                        device: label.clone(),
                    }),
            }
        })?;

        info!(device = %label, "opening audio input");
        Ok(Box::new(CpalFrameSource::new(cpal_device, label)))
    }
}

/// Frame-oriented capture source over a CPAL input stream.
///
/// Captures 16-bit PCM mono at the configured rate; tries the i16 stream
/// format first and falls back to f32 with conversion for devices that only
/// expose float formats.
pub struct CpalFrameSource {
    device: cpal::Device,
    label: String,
    stream: Option<SendableStream>,
    shared: Arc<SharedCapture>,
    sample_rate: u32,
    frame_size: usize,
}

impl CpalFrameSource {
    fn new(device: cpal::Device, label: String) -> Self {
        Self {
            device,
            label,
            stream: None,
            shared: Arc::new(SharedCapture {
                buffer: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
            }),
            sample_rate: defaults::SAMPLE_RATE,
            frame_size: defaults::FRAME_SIZE,
        }
    }

    fn capture_error(&self, message: String) -> SottoError {
        SottoError::Capture {
            device: self.label.clone(),
            message,
        }
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let failure = Arc::clone(&self.shared);
        let err_callback = move |err: cpal::StreamError| {
            if let Ok(mut slot) = failure.failure.lock() {
                slot.get_or_insert_with(|| err.to_string());
            }
        };

        // Preferred: i16 mono at the target rate. PipeWire/PulseAudio convert
        // transparently on most setups.
        let shared = Arc::clone(&self.shared);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = shared.buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback.clone(),
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 mono with conversion, for float-only devices.
        let shared = Arc::clone(&self.shared);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = shared.buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| self.capture_error(format!("failed to build input stream: {e}")))
    }
}

impl AudioSource for CpalFrameSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| self.capture_error(format!("failed to start stream: {e}")))?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .0
                .pause()
                .map_err(|e| self.capture_error(format!("failed to stop stream: {e}")))?;
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Vec<i16>>> {
        if let Ok(mut slot) = self.shared.failure.lock()
            && let Some(message) = slot.take()
        {
            return Err(self.capture_error(format!("stream error: {message}")));
        }

        let mut buffer = self
            .shared
            .buffer
            .lock()
            .map_err(|e| self.capture_error(format!("failed to lock capture buffer: {e}")))?;

        if buffer.len() < self.frame_size {
            return Ok(None);
        }
        let frame: Vec<i16> = buffer.drain(..self.frame_size).collect();
        Ok(Some(frame))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio hardware
    fn test_enumerate_devices() {
        let host = CpalAudioHost::new();
        let devices = host.devices().expect("enumeration failed");
        assert!(!devices.is_empty(), "expected at least one input device");
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_open_default_device() {
        let host = CpalAudioHost::new();
        let source = host.open(None);
        assert!(source.is_ok(), "failed to open default device");
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_open_out_of_range_index_fails() {
        let host = CpalAudioHost::new();
        let result = host.open(Some(usize::MAX));
        assert!(matches!(result, Err(SottoError::DeviceNotFound { .. })));
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_start_read_stop_cycle() {
        let host = CpalAudioHost::new();
        let mut source = host.open(None).expect("open failed");
        source.start().expect("start failed");
        std::thread::sleep(std::time::Duration::from_millis(200));
        // A frame may or may not be ready; either way the call must not fail.
        let _ = source.read_frame().expect("read failed");
        source.stop().expect("stop failed");
    }
}
