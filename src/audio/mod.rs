//! Audio capture and preprocessing.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod preprocess;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::CpalAudioHost;
pub use source::{AudioHost, AudioSource, MockAudioHost, MockAudioSource};
