//! Speech-to-text boundary. The model itself is a black box behind the
//! [`Transcriber`] trait.

pub mod command;
pub mod transcriber;

pub use command::CommandTranscriber;
pub use transcriber::{MockTranscriber, Transcriber};
