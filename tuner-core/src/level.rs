//! # Level Meter Module
//!
//! Converts the energy of a frame into a bounded, perceptually scaled level
//! for a meter display. Samples are expected as `f32` in [-1, 1], so 0 dB
//! corresponds to a full-scale square wave.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, TunerError};

/// Normalized loudness of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelReading {
    /// Meter position in [0, 1]; 0 is the dB floor, 1 is 0 dBFS.
    pub level: f32,
    /// Root-mean-square amplitude of the frame.
    pub rms: f32,
    /// Clamped decibel value, equal to the floor for silence.
    pub db: f32,
}

impl LevelReading {
    /// Reading for a frame with no energy.
    pub fn silent(db_floor: f32) -> Self {
        Self {
            level: 0.0,
            rms: 0.0,
            db: db_floor,
        }
    }
}

/// RMS level meter with a configurable dB floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMeter {
    db_floor: f32,
}

impl LevelMeter {
    /// Creates a meter whose floor maps to level 0.
    ///
    /// # Errors
    /// * `InvalidConfig` unless `db_floor` is finite and negative.
    pub fn new(db_floor: f32) -> Result<Self> {
        if !db_floor.is_finite() || db_floor >= 0.0 {
            return Err(TunerError::config(format!(
                "db_floor must be a negative number, got {db_floor}"
            )));
        }
        Ok(Self { db_floor })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.db_floor)
    }

    pub fn db_floor(&self) -> f32 {
        self.db_floor
    }

    /// Measures a frame (or any chunk of samples).
    ///
    /// Silence, empty input and non-finite samples all produce level 0
    /// without ever taking the logarithm of zero.
    pub fn measure(&self, samples: &[f32]) -> LevelReading {
        let rms = rms(samples);
        if !rms.is_finite() || rms <= 0.0 {
            return LevelReading::silent(self.db_floor);
        }

        let db = (20.0 * rms.log10()).clamp(self.db_floor, 0.0);
        let level = ((db - self.db_floor) / -self.db_floor).clamp(0.0, 1.0);
        LevelReading { level, rms, db }
    }
}

/// Root-mean-square amplitude; 0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> LevelMeter {
        LevelMeter::new(-60.0).unwrap()
    }

    #[test]
    fn silence_is_exactly_zero() {
        let reading = meter().measure(&vec![0.0; 2048]);
        assert_eq!(reading.level, 0.0);
        assert_eq!(reading.rms, 0.0);
        assert_eq!(reading.db, -60.0);
    }

    #[test]
    fn empty_and_non_finite_input_is_silent() {
        assert_eq!(meter().measure(&[]).level, 0.0);
        assert_eq!(meter().measure(&[0.5, f32::NAN, 0.2]).level, 0.0);
        assert_eq!(meter().measure(&[f32::INFINITY]).level, 0.0);
    }

    #[test]
    fn full_scale_hits_the_ceiling() {
        let samples: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let reading = meter().measure(&samples);
        assert!((reading.level - 1.0).abs() < 1e-6);
        assert!(reading.db.abs() < 1e-4);
    }

    #[test]
    fn minus_thirty_db_is_half_scale() {
        let amplitude = 10f32.powf(-30.0 / 20.0);
        let reading = meter().measure(&vec![amplitude; 512]);
        assert!((reading.db + 30.0).abs() < 1e-3);
        assert!((reading.level - 0.5).abs() < 1e-4);
    }

    #[test]
    fn below_floor_clamps_to_zero() {
        let reading = meter().measure(&vec![1e-6; 512]);
        assert_eq!(reading.db, -60.0);
        assert_eq!(reading.level, 0.0);
    }

    #[test]
    fn measurement_is_deterministic() {
        let samples: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.031).sin() * 0.3).collect();
        let first = meter().measure(&samples);
        for _ in 0..5 {
            assert_eq!(meter().measure(&samples), first);
        }
    }

    #[test]
    fn rejects_non_negative_floor() {
        assert!(LevelMeter::new(0.0).is_err());
        assert!(LevelMeter::new(f32::NAN).is_err());
    }
}
