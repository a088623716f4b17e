//! # Configuration Module
//!
//! Every tunable constant of the engine in one serde-friendly struct. Missing
//! fields in a JSON file fall back to the defaults below, so a config file
//! only needs to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ToleranceBands;
use crate::error::{Result, TunerError};
use crate::level::LevelMeter;
use crate::pitch::YinDetector;
use crate::window::Windower;

/// Sample rate the engine assumes unless told otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate of the capture stream in Hz.
    pub sample_rate: u32,
    /// Number of samples per analysis frame.
    pub frame_size: usize,
    /// Number of samples the read position advances between frames.
    pub hop_size: usize,
    /// YIN absolute threshold on the normalized difference function.
    pub yin_threshold: f32,
    /// Estimates with a lower confidence are reported as unvoiced.
    pub min_confidence: f32,
    /// Frames quieter than this RMS skip pitch detection entirely.
    pub amplitude_threshold: f32,
    /// Lowest detectable fundamental; sets the largest YIN lag.
    pub min_frequency_hz: f32,
    /// Highest detectable fundamental; sets the smallest YIN lag.
    pub max_frequency_hz: f32,
    /// Deviation (Hz) that still counts as in tune.
    pub inner_tolerance_hz: f32,
    /// Outer edges (Hz) of the deviation bands, strictly increasing.
    pub band_edges_hz: Vec<f32>,
    /// Level meter floor in dB; maps to a level of 0.
    pub db_floor: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: 4096,
            hop_size: 1024,
            yin_threshold: 0.15,
            min_confidence: 0.0,
            amplitude_threshold: 0.001,
            min_frequency_hz: 60.0,
            max_frequency_hz: 1500.0,
            inner_tolerance_hz: 3.0,
            band_edges_hz: vec![3.0, 6.0, 9.0, 12.0, 15.0],
            db_floor: -60.0,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Checks the configuration by building every component from it.
    ///
    /// Each component owns its own rules (hop not larger than the frame,
    /// frame long enough for the lag range, ordered bands, and so on); this
    /// simply runs all of them so errors surface before a worker starts.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TunerError::config("sample_rate must be positive"));
        }
        Windower::from_config(self)?;
        LevelMeter::from_config(self)?;
        YinDetector::from_config(self)?;
        ToleranceBands::from_config(self)?;
        Ok(())
    }
}
