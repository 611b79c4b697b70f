//! sotto - always-listening dictation core
//!
//! Listens to a microphone, detects speech against a self-calibrating energy
//! threshold, cuts the stream into bounded segments, and assembles the
//! transcribed fragments into sentences for a downstream consumer.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod stt;
pub mod vad;

// Core traits (source → process → sink)
pub use audio::source::{AudioHost, AudioSource};
pub use pipeline::sink::{EnergySink, TextSink};
pub use stt::transcriber::Transcriber;

// Pipeline
pub use pipeline::session::{Session, SessionHandle};

// Error handling
pub use error::{Result, SottoError};

// Config
pub use config::{ConfigStore, Settings, TomlConfigStore};
