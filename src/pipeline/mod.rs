//! Capture → transcription pipeline.
//!
//! A capture thread and a consumer thread, decoupled by an unbounded segment
//! channel and a lossy bounded energy channel.

pub mod capture;
pub mod consumer;
pub mod session;
pub mod sink;
pub mod types;

pub use capture::CaptureWorker;
pub use consumer::{ConsumerConfig, SentenceAssembler, TranscriptionConsumer, clean_transcript};
pub use session::{Session, SessionHandle};
pub use sink::{
    CollectorEnergySink, CollectorSink, EnergySink, MeterSink, NullEnergySink, StdoutSink, TextSink,
};
pub use types::{AudioFrame, EnergyReading, SpeechSegment};
