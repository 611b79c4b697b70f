//! Transcription via an external command.
//!
//! Pipes the segment as a WAV file to a user-supplied command's stdin and
//! reads the recognized text from its stdout. This keeps the recognition
//! model entirely outside the process: any local STT tool that accepts WAV on
//! stdin works (e.g. `whisper-cli -f - --no-timestamps`).

use crate::audio::wav;
use crate::error::{Result, SottoError};
use crate::stt::transcriber::Transcriber;
use std::io::Write;
use std::process::{Command, Stdio};

/// Transcriber that shells out to an external speech-to-text command.
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
}

impl CommandTranscriber {
    /// Build from a command line, e.g. `"whisper-cli -f - -l {lang}"`.
    ///
    /// The placeholder `{lang}` is replaced by the language passed to each
    /// transcribe call. The WAV is written to the command's stdin.
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SottoError::Transcription {
                message: "empty transcription command".to_string(),
            })?
            .to_string();
        Ok(Self {
            program,
            args: parts.map(|a| a.to_string()).collect(),
        })
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, samples: &[f32], sample_rate: u32, language: &str) -> Result<String> {
        let wav_bytes = wav::encode_wav(&wav::f32_to_i16(samples), sample_rate)?;

        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{lang}", language))
            .collect();

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SottoError::Transcription {
                message: format!("failed to spawn {}: {e}", self.program),
            })?;

        // Take stdin so it is closed after the write; the child needs EOF to
        // finish reading the WAV.
        if let Some(mut stdin) = child.stdin.take() {
            // A tool that stops reading early closes the pipe; that is its
            // call to make, not a failure here.
            if let Err(e) = stdin.write_all(&wav_bytes)
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(SottoError::Transcription {
                    message: format!("failed to write audio to {}: {e}", self.program),
                });
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SottoError::Transcription {
                message: format!("failed to wait for {}: {e}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SottoError::Transcription {
                message: format!(
                    "{} exited with {:?}: {}",
                    self.program,
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
