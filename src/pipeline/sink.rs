//! Output boundaries: finalized text and live energy levels.
//!
//! Sinks are how any UI subscribes to the pipeline. The core stays headless;
//! tests collect output through the same seams.

use crate::error::{Result, SottoError};
use crate::pipeline::types::EnergyReading;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Receives finalized sentences, in arrival order.
///
/// Failures are reported to the caller of the pipeline via logs; the core
/// never retries an insertion.
pub trait TextSink: Send + 'static {
    /// Handle one finalized sentence.
    fn write(&mut self, text: &str) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Prints finalized sentences to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl TextSink for StdoutSink {
    fn write(&mut self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(text.as_bytes())
            .and_then(|_| stdout.write_all(b"\n"))
            .and_then(|_| stdout.flush())
            .map_err(|e| SottoError::Sink {
                message: e.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Collects finalized sentences in memory, for tests and batch capture.
#[derive(Default)]
pub struct CollectorSink {
    texts: Arc<Mutex<Vec<String>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected sentences.
    pub fn texts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.texts)
    }
}

impl TextSink for CollectorSink {
    fn write(&mut self, text: &str) -> Result<()> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Receives live energy levels.
///
/// Must not block: the consumer drains readings between segments, and the
/// producer already drops readings under load.
pub trait EnergySink: Send + 'static {
    fn level(&self, reading: EnergyReading);
}

/// Discards all readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEnergySink;

impl EnergySink for NullEnergySink {
    fn level(&self, _reading: EnergyReading) {}
}

/// Renders a level meter to stderr, overwriting one line.
pub struct MeterSink {
    threshold: f32,
}

impl MeterSink {
    /// Meter with a marker at the detection threshold.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl EnergySink for MeterSink {
    fn level(&self, reading: EnergyReading) {
        const BAR_WIDTH: usize = 30;
        const FULL_SCALE: f32 = 2000.0;

        let filled =
            ((reading.level / FULL_SCALE) * BAR_WIDTH as f32).clamp(0.0, BAR_WIDTH as f32) as usize;
        let marker = ((self.threshold / FULL_SCALE) * BAR_WIDTH as f32)
            .clamp(0.0, (BAR_WIDTH - 1) as f32) as usize;

        let bar: String = (0..BAR_WIDTH)
            .map(|i| {
                if i < filled {
                    if reading.level > self.threshold { '█' } else { '▓' }
                } else if i == marker {
                    '│'
                } else {
                    '░'
                }
            })
            .collect();

        eprint!("\r[{}] {:7.1}  ", bar, reading.level);
        let _ = std::io::stderr().flush();
    }
}

/// Collects energy levels in memory, for tests.
#[derive(Default)]
pub struct CollectorEnergySink {
    levels: Arc<Mutex<Vec<f32>>>,
}

impl CollectorEnergySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.levels)
    }
}

impl EnergySink for CollectorEnergySink {
    fn level(&self, reading: EnergyReading) {
        if let Ok(mut levels) = self.levels.lock() {
            levels.push(reading.level);
        }
    }
}
