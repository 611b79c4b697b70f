//! Segmentation state machine: turns the frame stream into discrete speech
//! segments.
//!
//! Two families of cut decisions coexist. Sentence boundaries (long pause,
//! max length, energy drop) are checked first, in that fixed order, once the
//! utterance is long enough to be a sentence. Ordinary end of speech — a run
//! of trailing silent frames after enough recorded audio — is checked only
//! when no boundary fired, and carries no reason tag.

use crate::config::Settings;
use crate::defaults;
use crate::vad::clock::{Clock, SystemClock};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Configuration for the segmentation state machine.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Adaptive speech threshold in mean-absolute PCM units.
    pub threshold: f32,
    /// Silence duration that closes a sentence.
    pub sentence_pause: Duration,
    /// Minimum utterance duration before boundary cuts apply.
    pub min_sentence: Duration,
    /// Maximum utterance duration before a forced cut.
    pub max_sentence: Duration,
    /// Fraction of the threshold treated as a trailing-off voice.
    pub sentence_energy_factor: f32,
    /// Consecutive silent frames that end an ordinary utterance.
    pub silence_padding_frames: usize,
    /// Minimum utterance length in frames.
    pub min_phrase_frames: usize,
    /// Samples per frame, for the minimum-length comparison.
    pub frame_size: usize,
}

impl SegmenterConfig {
    /// Build a config from a settings snapshot and the calibrated threshold.
    pub fn from_settings(settings: &Settings, threshold: f32) -> Self {
        Self {
            threshold,
            sentence_pause: Duration::from_secs_f32(settings.detection.sentence_pause_threshold),
            min_sentence: Duration::from_secs_f32(settings.detection.min_sentence_length),
            max_sentence: Duration::from_secs_f32(settings.detection.max_sentence_length),
            sentence_energy_factor: settings.detection.sentence_energy_threshold,
            silence_padding_frames: settings.silence_padding_frames(),
            min_phrase_frames: settings.min_phrase_frames(),
            frame_size: defaults::FRAME_SIZE,
        }
    }
}

/// Why a sentence boundary was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutReason {
    /// Silence exceeded the sentence pause threshold.
    LongPause,
    /// The utterance hit the maximum sentence length.
    MaxLength,
    /// Voice trailed off: half a pause of silence plus low energy.
    EnergyDrop,
}

impl fmt::Display for CutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutReason::LongPause => write!(f, "long pause"),
            CutReason::MaxLength => write!(f, "max length"),
            CutReason::EnergyDrop => write!(f, "energy drop"),
        }
    }
}

/// A completed segment cut off the live stream.
#[derive(Debug)]
pub struct SegmentCut {
    /// Pre-roll plus live samples, in capture order.
    pub samples: Vec<i16>,
    /// When the Idle→Speaking transition happened.
    pub started_at: Instant,
    /// Strictly increasing within a session.
    pub sequence: u64,
    /// Boundary reason; None for an ordinary end of speech.
    pub reason: Option<CutReason>,
}

enum State {
    Idle,
    Speaking {
        buffer: Vec<i16>,
        started_at: Instant,
        last_speech: Instant,
        silent_run: usize,
        live_frames: usize,
    },
}

/// Voice segmentation state machine.
pub struct Segmenter<C: Clock = SystemClock> {
    config: SegmenterConfig,
    state: State,
    next_sequence: u64,
    clock: C,
}

impl Segmenter<SystemClock> {
    /// Creates a segmenter using the system clock.
    pub fn new(config: SegmenterConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Segmenter<C> {
    /// Creates a segmenter with an injectable clock.
    pub fn with_clock(config: SegmenterConfig, clock: C) -> Self {
        Self {
            config,
            state: State::Idle,
            next_sequence: 0,
            clock,
        }
    }

    /// Feed one frame and its smoothed energy.
    ///
    /// `pre_roll` must be the ring contents from immediately *before* this
    /// frame; it seeds the segment buffer when speech starts so onsets are
    /// not clipped.
    ///
    /// Returns a segment when a cut decision fires.
    pub fn feed<'a, I>(
        &mut self,
        frame: &[i16],
        smoothed_energy: f32,
        pre_roll: I,
    ) -> Option<SegmentCut>
    where
        I: IntoIterator<Item = &'a [i16]>,
    {
        let is_speech = smoothed_energy > self.config.threshold;
        let now = self.clock.now();

        if let State::Idle = self.state {
            if !is_speech {
                return None;
            }
            let mut buffer = Vec::new();
            for held in pre_roll {
                buffer.extend_from_slice(held);
            }
            debug!(energy = smoothed_energy, "speech detected");
            self.state = State::Speaking {
                buffer,
                started_at: now,
                last_speech: now,
                silent_run: 0,
                live_frames: 0,
            };
        }

        let State::Speaking {
            buffer,
            started_at,
            last_speech,
            silent_run,
            live_frames,
        } = &mut self.state
        else {
            return None;
        };

        buffer.extend_from_slice(frame);
        *live_frames += 1;
        if is_speech {
            *last_speech = now;
            *silent_run = 0;
        } else {
            *silent_run += 1;
        }

        let duration = now.duration_since(*started_at);
        let silence = now.duration_since(*last_speech);

        // Sentence boundaries, in fixed priority, once the utterance is long
        // enough to count as a sentence.
        let reason = if duration >= self.config.min_sentence {
            if silence >= self.config.sentence_pause {
                Some(CutReason::LongPause)
            } else if duration >= self.config.max_sentence {
                Some(CutReason::MaxLength)
            } else if silence >= self.config.sentence_pause / 2
                && smoothed_energy < self.config.threshold * self.config.sentence_energy_factor
            {
                Some(CutReason::EnergyDrop)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(reason) = reason {
            let samples = std::mem::take(buffer);
            let started = *started_at;
            self.state = State::Idle;
            info!(reason = %reason, samples = samples.len(), "sentence boundary detected");
            return Some(self.cut(samples, started, Some(reason)));
        }

        // Ordinary end of speech: enough trailing silence after enough
        // recorded frames. Resets either way; emits only if the buffer
        // exceeds the minimum phrase length.
        if *silent_run >= self.config.silence_padding_frames
            && *live_frames >= self.config.min_phrase_frames
        {
            let long_enough =
                buffer.len() > self.config.min_phrase_frames * self.config.frame_size;
            let samples = std::mem::take(buffer);
            let started = *started_at;
            self.state = State::Idle;
            if long_enough {
                debug!(samples = samples.len(), "end of speech");
                return Some(self.cut(samples, started, None));
            }
            debug!("discarding too-short utterance");
        }

        None
    }

    fn cut(&mut self, samples: Vec<i16>, started_at: Instant, reason: Option<CutReason>) -> SegmentCut {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        SegmentCut {
            samples,
            started_at,
            sequence,
            reason,
        }
    }

    /// True while an utterance is being accumulated.
    pub fn is_speaking(&self) -> bool {
        matches!(self.state, State::Speaking { .. })
    }

    /// Discards any partially accumulated utterance.
    ///
    /// Used at shutdown; there is no forced flush.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}
