//! Session settings and their persistence boundary.
//!
//! A [`Settings`] value is an immutable snapshot: it is cloned into a session
//! at start and never observed mutating while the session runs. The core only
//! writes updated calibration fields back through a [`ConfigStore`], it never
//! touches files on its own.

use crate::defaults;
use crate::error::{Result, SottoError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Root settings structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub detection: DetectionSettings,
    pub stt: SttSettings,
    pub calibration: CalibrationSettings,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    /// Input device index into the enumerated device list; None = system default.
    pub input_device_index: Option<usize>,
    pub sample_rate: u32,
    /// Seconds of audio prepended before a detected speech onset.
    pub pre_padding: f32,
    /// Seconds of trailing silence that end an ordinary utterance.
    pub silence_padding: f32,
    /// Minimum utterance duration worth transcribing, in seconds.
    pub min_phrase_duration: f32,
    pub use_noise_reduction: bool,
    /// Write each emitted segment to debug_audio/speech_<n>.wav.
    pub debug_audio: bool,
}

/// Speech detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Speech energy threshold in mean-absolute PCM units.
    ///
    /// Overwritten at session start by the calibrated adaptive threshold.
    pub silence_threshold: f32,
    /// Multiplier on the noise baseline producing the adaptive threshold.
    pub speech_energy_threshold: f32,
    /// Silence duration that closes a sentence, in seconds.
    pub sentence_pause_threshold: f32,
    /// Fraction of the threshold treated as a trailing-off voice.
    pub sentence_energy_threshold: f32,
    /// Minimum duration before sentence-boundary cuts apply, in seconds.
    pub min_sentence_length: f32,
    /// Maximum utterance duration before a forced cut, in seconds.
    pub max_sentence_length: f32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttSettings {
    pub language: String,
}

/// Cached microphone calibration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Noise-floor baseline energy; None if never calibrated.
    pub energy: Option<f32>,
    /// Unix timestamp (seconds) of the last calibration run.
    pub timestamp: u64,
    /// Device the baseline was measured on; None = system default.
    pub device_index: Option<usize>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_device_index: None,
            sample_rate: defaults::SAMPLE_RATE,
            pre_padding: defaults::PRE_PADDING_SECS,
            silence_padding: defaults::SILENCE_PADDING_SECS,
            min_phrase_duration: defaults::MIN_PHRASE_SECS,
            use_noise_reduction: true,
            debug_audio: false,
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            silence_threshold: defaults::SILENCE_THRESHOLD,
            speech_energy_threshold: defaults::SPEECH_ENERGY_FACTOR,
            sentence_pause_threshold: defaults::SENTENCE_PAUSE_SECS,
            sentence_energy_threshold: defaults::SENTENCE_ENERGY_FACTOR,
            min_sentence_length: defaults::MIN_SENTENCE_SECS,
            max_sentence_length: defaults::MAX_SENTENCE_SECS,
        }
    }
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SottoError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SottoError::Io(e)
            }
        })?;
        let settings: Settings = toml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, or return defaults if the file is missing.
    ///
    /// Invalid TOML still surfaces as an error; only absence is forgiven.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(settings) => Ok(settings),
            Err(SottoError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - SOTTO_LANGUAGE → stt.language
    /// - SOTTO_DEVICE → audio.input_device_index (numeric index)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("SOTTO_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(device) = std::env::var("SOTTO_DEVICE")
            && let Ok(index) = device.parse::<usize>()
        {
            self.audio.input_device_index = Some(index);
        }

        self
    }

    /// Reject settings a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(SottoError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.detection.max_sentence_length <= self.detection.min_sentence_length {
            return Err(SottoError::ConfigInvalidValue {
                key: "detection.max_sentence_length".to_string(),
                message: "must exceed min_sentence_length".to_string(),
            });
        }
        if self.detection.sentence_pause_threshold <= 0.0 {
            return Err(SottoError::ConfigInvalidValue {
                key: "detection.sentence_pause_threshold".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.detection.speech_energy_threshold <= 0.0 {
            return Err(SottoError::ConfigInvalidValue {
                key: "detection.speech_energy_threshold".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Pre-roll ring capacity in frames.
    pub fn pre_padding_frames(&self) -> usize {
        seconds_to_frames(self.audio.pre_padding, self.audio.sample_rate)
    }

    /// Trailing-silence run length that ends an utterance, in frames.
    pub fn silence_padding_frames(&self) -> usize {
        seconds_to_frames(self.audio.silence_padding, self.audio.sample_rate)
    }

    /// Minimum utterance length in frames.
    pub fn min_phrase_frames(&self) -> usize {
        seconds_to_frames(self.audio.min_phrase_duration, self.audio.sample_rate)
    }

    /// Get the default configuration file path.
    ///
    /// Returns ~/.config/sotto/config.toml on Linux.
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("sotto")
            .join("config.toml")
    }
}

fn seconds_to_frames(seconds: f32, sample_rate: u32) -> usize {
    (seconds * sample_rate as f32 / defaults::FRAME_SIZE as f32) as usize
}

/// Persistence boundary for settings.
///
/// The pipeline asks a store to persist updated calibration fields; how and
/// where they land is the store's concern.
pub trait ConfigStore: Send + Sync {
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Stores settings as a TOML file.
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn save(&self, settings: &Settings) -> Result<()> {
        let contents = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// In-memory store for tests; records the last saved snapshot.
#[derive(Default)]
pub struct MemoryConfigStore {
    saved: Mutex<Option<Settings>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently saved settings, if any.
    pub fn last_saved(&self) -> Option<Settings> {
        self.saved.lock().ok().and_then(|guard| guard.clone())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn save(&self, settings: &Settings) -> Result<()> {
        if let Ok(mut guard) = self.saved.lock() {
            *guard = Some(settings.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings_have_correct_values() {
        let settings = Settings::default();

        assert_eq!(settings.audio.input_device_index, None);
        assert_eq!(settings.audio.sample_rate, 16000);
        assert_eq!(settings.audio.pre_padding, 0.5);
        assert_eq!(settings.audio.silence_padding, 0.3);
        assert_eq!(settings.audio.min_phrase_duration, 0.5);
        assert!(settings.audio.use_noise_reduction);
        assert!(!settings.audio.debug_audio);

        assert_eq!(settings.detection.silence_threshold, 500.0);
        assert_eq!(settings.detection.speech_energy_threshold, 3.0);
        assert_eq!(settings.detection.sentence_pause_threshold, 1.0);
        assert_eq!(settings.detection.sentence_energy_threshold, 0.3);
        assert_eq!(settings.detection.min_sentence_length, 0.8);
        assert_eq!(settings.detection.max_sentence_length, 10.0);

        assert_eq!(settings.stt.language, "en");

        assert_eq!(settings.calibration.energy, None);
        assert_eq!(settings.calibration.timestamp, 0);
        assert_eq!(settings.calibration.device_index, None);
    }

    #[test]
    fn test_frame_conversions_at_defaults() {
        let settings = Settings::default();
        // 0.5s * 16000 / 1024 = 7.8 -> 7
        assert_eq!(settings.pre_padding_frames(), 7);
        // 0.3s * 16000 / 1024 = 4.7 -> 4
        assert_eq!(settings.silence_padding_frames(), 4);
        assert_eq!(settings.min_phrase_frames(), 7);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            input_device_index = 2
            sample_rate = 48000
            pre_padding = 0.25
            use_noise_reduction = false

            [detection]
            silence_threshold = 420.0
            speech_energy_threshold = 2.5

            [stt]
            language = "de"

            [calibration]
            energy = 210.5
            timestamp = 1700000000
            device_index = 2
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let settings = Settings::load(temp_file.path()).unwrap();

        assert_eq!(settings.audio.input_device_index, Some(2));
        assert_eq!(settings.audio.sample_rate, 48000);
        assert_eq!(settings.audio.pre_padding, 0.25);
        assert!(!settings.audio.use_noise_reduction);
        // Unset fields keep defaults
        assert_eq!(settings.audio.silence_padding, 0.3);

        assert_eq!(settings.detection.silence_threshold, 420.0);
        assert_eq!(settings.detection.speech_energy_threshold, 2.5);
        assert_eq!(settings.detection.sentence_pause_threshold, 1.0);

        assert_eq!(settings.stt.language, "de");

        assert_eq!(settings.calibration.energy, Some(210.5));
        assert_eq!(settings.calibration.timestamp, 1_700_000_000);
        assert_eq!(settings.calibration.device_index, Some(2));
    }

    #[test]
    fn test_roundtrip_preserves_threshold_inputs_exactly() {
        let mut settings = Settings::default();
        settings.detection.silence_threshold = 637.25;
        settings.detection.speech_energy_threshold = 2.75;
        settings.calibration.energy = Some(212.375);
        settings.calibration.timestamp = 1_712_345_678;
        settings.calibration.device_index = Some(1);

        let serialized = toml::to_string_pretty(&settings).unwrap();
        let restored: Settings = toml::from_str(&serialized).unwrap();

        // The adaptive-threshold inputs must survive serialization bit-for-bit.
        assert_eq!(
            restored.detection.silence_threshold.to_bits(),
            settings.detection.silence_threshold.to_bits()
        );
        assert_eq!(
            restored.detection.speech_energy_threshold.to_bits(),
            settings.detection.speech_energy_threshold.to_bits()
        );
        assert_eq!(
            restored.calibration.energy.unwrap().to_bits(),
            settings.calibration.energy.unwrap().to_bits()
        );
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing = Path::new("/tmp/nonexistent_sotto_config_98765.toml");
        let settings = Settings::load_or_default(missing).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let invalid_toml = r#"
            [audio
            sample_rate = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Settings::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut settings = Settings::default();
        settings.audio.sample_rate = 0;
        assert!(matches!(
            settings.validate(),
            Err(SottoError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_sentence_bounds() {
        let mut settings = Settings::default();
        settings.detection.min_sentence_length = 5.0;
        settings.detection.max_sentence_length = 2.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let store = TomlConfigStore::new(path.clone());

        let mut settings = Settings::default();
        settings.calibration.energy = Some(199.5);
        settings.calibration.device_index = Some(4);

        store.save(&settings).unwrap();
        let restored = Settings::load(&path).unwrap();
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_memory_store_records_last_save() {
        let store = MemoryConfigStore::new();
        assert!(store.last_saved().is_none());

        let mut settings = Settings::default();
        settings.calibration.energy = Some(321.0);
        store.save(&settings).unwrap();

        let saved = store.last_saved().unwrap();
        assert_eq!(saved.calibration.energy, Some(321.0));
    }
}
