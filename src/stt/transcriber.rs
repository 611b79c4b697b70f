//! Transcription trait and test double.

use crate::error::{Result, SottoError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (a real engine vs mock). Calls
/// may block for arbitrarily long; the pipeline never invokes them from the
/// capture thread.
pub trait Transcriber: Send + Sync {
    /// Transcribe preprocessed audio to text.
    ///
    /// # Arguments
    /// * `samples` - Mono float32 audio in [-1, 1]
    /// * `sample_rate` - Sample rate in Hz
    /// * `language` - BCP-47-ish language code, e.g. "en"
    ///
    /// # Returns
    /// Transcribed text (possibly empty) or an error. Errors are treated as
    /// empty text by the consumer.
    fn transcribe(&self, samples: &[f32], sample_rate: u32, language: &str) -> Result<String>;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
impl<T: Transcriber> Transcriber for Arc<T> {
    fn transcribe(&self, samples: &[f32], sample_rate: u32, language: &str) -> Result<String> {
        (**self).transcribe(samples, sample_rate, language)
    }
}

/// Mock transcriber for testing.
///
/// Yields scripted responses in order; repeats the last one when the script
/// runs out.
pub struct MockTranscriber {
    responses: Vec<String>,
    calls: AtomicUsize,
    should_fail: bool,
}

impl MockTranscriber {
    /// Create a mock that always returns the given text.
    pub fn new(response: &str) -> Self {
        Self {
            responses: vec![response.to_string()],
            calls: AtomicUsize::new(0),
            should_fail: false,
        }
    }

    /// Create a mock that returns the given texts in order.
    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            calls: AtomicUsize::new(0),
            should_fail: false,
        }
    }

    /// Configure the mock to fail every call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of transcribe calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _samples: &[f32], _sample_rate: u32, _language: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(SottoError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        let index = call.min(self.responses.len().saturating_sub(1));
        Ok(self
            .responses
            .get(index)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_response() {
        let transcriber = MockTranscriber::new("hello there");
        let text = transcriber.transcribe(&[0.0; 100], 16000, "en").unwrap();
        assert_eq!(text, "hello there");
    }

    #[test]
    fn test_mock_scripted_responses_in_order() {
        let transcriber = MockTranscriber::with_responses(&["one", "two"]);
        assert_eq!(transcriber.transcribe(&[], 16000, "en").unwrap(), "one");
        assert_eq!(transcriber.transcribe(&[], 16000, "en").unwrap(), "two");
        // Script exhausted: last response repeats.
        assert_eq!(transcriber.transcribe(&[], 16000, "en").unwrap(), "two");
        assert_eq!(transcriber.call_count(), 3);
    }

    #[test]
    fn test_mock_failure() {
        let transcriber = MockTranscriber::new("ignored").with_failure();
        let result = transcriber.transcribe(&[0.0; 10], 16000, "en");
        assert!(matches!(result, Err(SottoError::Transcription { .. })));
    }

    #[test]
    fn test_trait_is_object_safe() {
        let transcriber: Box<dyn Transcriber> = Box::new(MockTranscriber::new("boxed"));
        assert_eq!(
            transcriber.transcribe(&[], 16000, "en").unwrap(),
            "boxed"
        );
    }

    #[test]
    fn test_arc_sharing() {
        let transcriber = Arc::new(MockTranscriber::new("shared"));
        let clone = Arc::clone(&transcriber);
        assert_eq!(clone.transcribe(&[], 16000, "en").unwrap(), "shared");
        assert_eq!(transcriber.call_count(), 1);
    }
}
