//! # Frame Analysis Module
//!
//! Runs the level meter and the pitch detector independently on one frame
//! and derives everything the display needs from their outputs.

use serde::{Deserialize, Serialize};

use crate::classify::{DeviationZone, TargetPitch, ToleranceBands};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::level::{LevelMeter, LevelReading};
use crate::pitch::{PitchEstimate, YinDetector};
use crate::tuning::{self, Note};
use crate::window::AudioFrame;

/// Everything derived from a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub level: LevelReading,
    pub pitch: PitchEstimate,
    /// Nearest note; `None` ("N/A") when unvoiced.
    pub note: Option<Note>,
    /// Deviation in cents from the target, or from the nearest note when no
    /// target is set.
    pub cents: Option<f32>,
    pub zone: DeviationZone,
}

/// Per-frame analysis pipeline.
#[derive(Debug)]
pub struct Analyzer {
    meter: LevelMeter,
    detector: YinDetector,
    bands: ToleranceBands,
}

impl Analyzer {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            meter: LevelMeter::from_config(config)?,
            detector: YinDetector::from_config(config)?,
            bands: ToleranceBands::from_config(config)?,
        })
    }

    /// Smallest frame the detector can analyze at `sample_rate`.
    pub fn required_frame_size(&self, sample_rate: u32) -> usize {
        self.detector.required_frame_size(sample_rate)
    }

    /// Analyzes one frame against the current target.
    pub fn analyze(&mut self, frame: &AudioFrame, target: TargetPitch) -> Reading {
        let level = self.meter.measure(frame.samples());
        let pitch = self.detector.detect(frame);

        let freq = pitch.frequency();
        let note = freq.and_then(tuning::note_for_frequency);
        let cents = match (freq, target.frequency()) {
            (Some(freq), Some(target)) => Some(tuning::calculate_cents_deviation(freq, target)),
            (Some(freq), None) => tuning::cents_from_nearest(freq),
            _ => None,
        };
        let zone = self.bands.classify(&pitch, target);

        Reading {
            level,
            pitch,
            note,
            cents,
            zone,
        }
    }
}
