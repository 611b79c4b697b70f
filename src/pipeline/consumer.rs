//! Transcription consumer: pulls segments, produces text, assembles
//! sentences.
//!
//! Runs on its own thread, fully decoupled from capture. Transcription may
//! block for arbitrary amounts of time; that throttles sentence output but
//! never capture.

use crate::audio::{preprocess, wav};
use crate::config::Settings;
use crate::defaults;
use crate::pipeline::sink::{EnergySink, TextSink};
use crate::pipeline::types::{EnergyReading, SpeechSegment};
use crate::stt::transcriber::Transcriber;
use crate::vad::clock::{Clock, SystemClock};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Strip non-speech annotations and collapse whitespace.
///
/// Recognition engines wrap annotations in `[…]`, `(…)`, or `*…*`; these
/// never contain real speech. Unmatched openers are kept as-is.
pub fn clean_transcript(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            '[' | '(' | '*' => {
                let close = match ch {
                    '[' => ']',
                    '(' => ')',
                    _ => '*',
                };
                chars.next();
                let mut buf = String::new();
                let mut found_close = false;
                while let Some(&inner) = chars.peek() {
                    if inner == close {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    buf.push(inner);
                    chars.next();
                }
                if !found_close {
                    result.push(ch);
                    result.push_str(&buf);
                }
            }
            _ => {
                result.push(ch);
                chars.next();
            }
        }
    }

    let mut cleaned = String::with_capacity(result.len());
    let mut prev_space = false;
    for ch in result.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                cleaned.push(' ');
            }
            prev_space = true;
        } else {
            cleaned.push(ch);
            prev_space = false;
        }
    }
    cleaned.trim().to_string()
}

fn ends_sentence(fragment: &str) -> bool {
    fragment.trim_end().ends_with(['.', '!', '?'])
}

/// Merges transcribed fragments into finalized sentences.
///
/// Fragments arriving within the pause window of each other belong to one
/// sentence; terminal punctuation or a quiet stretch finalizes it. Every
/// finalize yields exactly one space-joined string with a trailing space, and
/// a finalized buffer is never emitted twice.
pub struct SentenceAssembler<C: Clock = SystemClock> {
    buffer: Vec<String>,
    last_update: Option<Instant>,
    pause: Duration,
    clock: C,
}

impl SentenceAssembler<SystemClock> {
    pub fn new(pause: Duration) -> Self {
        Self::with_clock(pause, SystemClock)
    }
}

impl<C: Clock> SentenceAssembler<C> {
    pub fn with_clock(pause: Duration, clock: C) -> Self {
        Self {
            buffer: Vec::new(),
            last_update: None,
            pause,
            clock,
        }
    }

    /// Feed one cleaned, non-empty fragment.
    ///
    /// Returns a finalized sentence when this fragment completes one
    /// (continuity + terminal punctuation) or interrupts a pending one
    /// (discontinuity with a non-empty buffer).
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        let now = self.clock.now();
        let continuous = self
            .last_update
            .is_some_and(|last| now.duration_since(last) < self.pause);

        let finalized = if continuous {
            self.buffer.push(fragment.to_string());
            if ends_sentence(fragment) {
                Some(self.take_buffer())
            } else {
                None
            }
        } else {
            let pending = if self.buffer.is_empty() {
                None
            } else {
                Some(self.take_buffer())
            };
            self.buffer.push(fragment.to_string());
            pending
        };

        self.last_update = Some(now);
        finalized
    }

    /// Flush a stale buffer: non-empty and quiet for longer than the pause.
    ///
    /// Called independently of fragment arrivals so a trailing fragment that
    /// never gets a follow-up still comes out with bounded latency.
    pub fn poll(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let now = self.clock.now();
        let stale = self
            .last_update
            .is_none_or(|last| now.duration_since(last) > self.pause);
        if stale {
            self.last_update = None;
            Some(self.take_buffer())
        } else {
            None
        }
    }

    /// True if no fragments are pending finalization.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn take_buffer(&mut self) -> String {
        let mut joined = self.buffer.join(" ");
        joined.push(' ');
        self.buffer.clear();
        joined
    }
}

/// Consumer-side configuration, snapshotted from the session settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub language: String,
    pub use_noise_reduction: bool,
    pub sentence_pause: Duration,
    /// Directory for per-segment WAV dumps; None disables them.
    pub debug_audio_dir: Option<PathBuf>,
    pub poll_timeout: Duration,
}

impl ConsumerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            language: settings.stt.language.clone(),
            use_noise_reduction: settings.audio.use_noise_reduction,
            sentence_pause: Duration::from_secs_f32(settings.detection.sentence_pause_threshold),
            debug_audio_dir: settings
                .audio
                .debug_audio
                .then(|| PathBuf::from("debug_audio")),
            poll_timeout: Duration::from_millis(defaults::SEGMENT_POLL_MS),
        }
    }
}

/// Pulls segments off the channel, transcribes them, and assembles sentences.
pub struct TranscriptionConsumer<T: Transcriber> {
    transcriber: T,
    config: ConsumerConfig,
    assembler: SentenceAssembler<SystemClock>,
}

impl<T: Transcriber> TranscriptionConsumer<T> {
    pub fn new(transcriber: T, config: ConsumerConfig) -> Self {
        let assembler = SentenceAssembler::new(config.sentence_pause);
        Self {
            transcriber,
            config,
            assembler,
        }
    }

    /// Consumer loop.
    ///
    /// Each iteration pops one segment (with a short timeout purely to keep
    /// the loop responsive), drains the energy channel, and runs the sentence
    /// timeout flush. Stops once `running` clears and the segment channel is
    /// drained, without interrupting an in-flight transcription.
    pub fn run(
        mut self,
        segments: Receiver<SpeechSegment>,
        energy: Receiver<EnergyReading>,
        text_sink: &mut dyn TextSink,
        energy_sink: &dyn EnergySink,
        running: &AtomicBool,
    ) {
        loop {
            let mut disconnected = false;
            match segments.recv_timeout(self.config.poll_timeout) {
                Ok(segment) => self.handle_segment(segment, text_sink),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => disconnected = true,
            }

            while let Ok(reading) = energy.try_recv() {
                energy_sink.level(reading);
            }

            if let Some(sentence) = self.assembler.poll() {
                deliver(text_sink, &sentence);
            }

            if disconnected || (!running.load(Ordering::SeqCst) && segments.is_empty()) {
                break;
            }
        }
        debug!("transcription consumer finished");
    }

    fn handle_segment(&mut self, segment: SpeechSegment, text_sink: &mut dyn TextSink) {
        debug!(
            sequence = segment.sequence,
            samples = segment.samples.len(),
            "transcribing segment"
        );

        if let Some(dir) = &self.config.debug_audio_dir
            && let Err(e) =
                wav::save_debug_wav(dir, segment.sequence, &segment.samples, segment.sample_rate)
        {
            warn!(error = %e, "failed to write debug audio");
        }

        let sample_rate = segment.sample_rate;
        let audio = preprocess::preprocess(
            &segment.samples,
            sample_rate,
            self.config.use_noise_reduction,
        );
        // Segment samples are released here; only the float buffer remains.
        drop(segment);

        let text = match self
            .transcriber
            .transcribe(&audio, sample_rate, &self.config.language)
        {
            Ok(text) => text,
            Err(e) => {
                warn!(stage = "transcription", error = %e, "treating failed transcription as empty");
                String::new()
            }
        };
        drop(audio);

        let cleaned = clean_transcript(&text);
        if cleaned.is_empty() {
            return;
        }

        if let Some(sentence) = self.assembler.push(&cleaned) {
            deliver(text_sink, &sentence);
        }
    }
}

fn deliver(sink: &mut dyn TextSink, sentence: &str) {
    if let Err(e) = sink.write(sentence) {
        warn!(sink = sink.name(), error = %e, "text sink rejected sentence");
    }
}
