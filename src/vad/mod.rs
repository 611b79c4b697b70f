//! Voice activity detection: calibration, energy tracking, and segmentation.

pub mod calibrator;
pub mod clock;
pub mod energy;
pub mod segmenter;

pub use calibrator::{CalibrationProfile, Calibrator};
pub use clock::{Clock, MockClock, SystemClock};
pub use energy::{EnergyTracker, frame_energy};
pub use segmenter::{CutReason, SegmentCut, Segmenter, SegmenterConfig};
