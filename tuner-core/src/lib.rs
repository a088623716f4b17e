// tuner-core/src/lib.rs

//! The core logic for the instrument tuner.
//! This crate is responsible for audio capture, framing, level metering,
//! pitch detection, note mapping and deviation classification. It is
//! completely headless and contains no UI code: a front end starts a
//! [`TunerEngine`] and polls the latest [`TunerSnapshot`].

pub mod analysis;
pub mod audio;
pub mod capture;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod fft;
pub mod level;
pub mod pitch;
pub mod tuning;
pub mod window;

pub use analysis::{Analyzer, Reading};
pub use audio::CpalCapture;
pub use capture::{CaptureEvent, CaptureSource, ChannelCapture, SampleFeeder};
pub use classify::{Band, DeviationZone, TargetPitch, ToleranceBands};
pub use config::EngineConfig;
pub use engine::{EngineStatus, TunerEngine, TunerHandle, TunerSnapshot};
pub use error::{Result, TunerError};
pub use level::{LevelMeter, LevelReading};
pub use pitch::{PitchEstimate, YinDetector};
pub use tuning::{Note, PitchClass};
pub use window::{AudioFrame, Windower};
