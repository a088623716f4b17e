//! # Deviation Classification Module
//!
//! Buckets the distance between a detected pitch and the selected target
//! into the discrete zones that drive the tuning needle. Zones are symmetric
//! around the target and every deviation falls into exactly one of them:
//! each band is half-open, `(lower, upper]`, so shared edges belong to the
//! band closer to the target.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, TunerError};
use crate::pitch::PitchEstimate;
use crate::tuning::Note;

/// The frequency being tuned toward, or unset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetPitch(Option<f32>);

impl TargetPitch {
    /// No target selected; classification is disabled.
    pub const UNSET: TargetPitch = TargetPitch(None);

    /// Target at `hz`. Non-positive or non-finite values leave it unset.
    pub fn hz(hz: f32) -> Self {
        if hz.is_finite() && hz > 0.0 {
            Self(Some(hz))
        } else {
            Self::UNSET
        }
    }

    pub fn note(note: Note) -> Self {
        Self::hz(note.frequency())
    }

    pub fn frequency(&self) -> Option<f32> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

/// How far outside the in-tune window a deviation lies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    /// Inner bands, numbered outward from 1.
    Near(u8),
    /// The outermost bounded band.
    Far,
    /// Beyond the last boundary.
    Very,
}

/// Display zone for the tuning needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviationZone {
    /// No target, or no voiced pitch to compare.
    #[default]
    Neutral,
    InTune,
    Flat(Band),
    Sharp(Band),
}

impl fmt::Display for DeviationZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviationZone::Neutral => write!(f, "-"),
            DeviationZone::InTune => write!(f, "in tune"),
            DeviationZone::Flat(band) => write_band(f, "flat", band),
            DeviationZone::Sharp(band) => write_band(f, "sharp", band),
        }
    }
}

fn write_band(f: &mut fmt::Formatter<'_>, direction: &str, band: &Band) -> fmt::Result {
    match band {
        Band::Near(n) => write!(f, "near {direction} {n}"),
        Band::Far => write!(f, "far {direction}"),
        Band::Very => write!(f, "very {direction}"),
    }
}

/// Ordered band boundaries in Hz of absolute deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceBands {
    /// `edges[0]` is the in-tune tolerance; the rest are outer band edges.
    edges: Vec<f32>,
}

impl ToleranceBands {
    /// Builds the banding from an inner tolerance and outer band edges.
    ///
    /// Edges that do not exceed the inner tolerance are folded into it, so
    /// the default `3` Hz tolerance with edges `[3, 6, 9, 12, 15]` yields
    /// in-tune up to 3 Hz and bands `(3,6] (6,9] (9,12] (12,15] (15,∞)`.
    ///
    /// # Errors
    /// * `InvalidConfig` if the tolerance is negative or any edge is
    ///   non-finite, non-positive, or out of strictly increasing order
    pub fn new(inner_tolerance_hz: f32, band_edges_hz: &[f32]) -> Result<Self> {
        if !(inner_tolerance_hz.is_finite() && inner_tolerance_hz >= 0.0) {
            return Err(TunerError::config(
                "inner_tolerance_hz must be a non-negative number",
            ));
        }
        if band_edges_hz.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            return Err(TunerError::config("band edges must be positive numbers"));
        }
        if band_edges_hz.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TunerError::config(format!(
                "band edges must be strictly increasing, got {band_edges_hz:?}"
            )));
        }

        let mut edges = vec![inner_tolerance_hz];
        edges.extend(band_edges_hz.iter().copied().filter(|&e| e > inner_tolerance_hz));
        Ok(Self { edges })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.inner_tolerance_hz, &config.band_edges_hz)
    }

    pub fn inner_tolerance(&self) -> f32 {
        self.edges[0]
    }

    /// Number of bands on each side of the in-tune window.
    pub fn band_count(&self) -> usize {
        self.edges.len()
    }

    /// Classifies a signed deviation in Hz (positive is sharp).
    pub fn zone_for_deviation(&self, deviation_hz: f32) -> DeviationZone {
        if deviation_hz.is_nan() {
            return DeviationZone::Neutral;
        }
        let magnitude = deviation_hz.abs();
        let outside = self.edges.iter().take_while(|&&edge| magnitude > edge).count();
        if outside == 0 {
            return DeviationZone::InTune;
        }

        let band = if outside == self.edges.len() {
            Band::Very
        } else if outside + 1 == self.edges.len() {
            Band::Far
        } else {
            Band::Near(outside.min(u8::MAX as usize) as u8)
        };
        if deviation_hz < 0.0 {
            DeviationZone::Flat(band)
        } else {
            DeviationZone::Sharp(band)
        }
    }

    /// Classifies a pitch estimate against a target.
    pub fn classify(&self, pitch: &PitchEstimate, target: TargetPitch) -> DeviationZone {
        match (pitch.frequency(), target.frequency()) {
            (Some(freq), Some(target)) => self.zone_for_deviation(freq - target),
            _ => DeviationZone::Neutral,
        }
    }
}

impl Default for ToleranceBands {
    fn default() -> Self {
        Self {
            edges: vec![3.0, 6.0, 9.0, 12.0, 15.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(target: f32, pitch: f32) -> DeviationZone {
        let pitch = PitchEstimate::voiced(pitch, 0.95);
        ToleranceBands::default().classify(&pitch, TargetPitch::hz(target))
    }

    #[test]
    fn default_matches_default_config() {
        assert_eq!(
            ToleranceBands::from_config(&EngineConfig::default()).unwrap(),
            ToleranceBands::default()
        );
    }

    #[test]
    fn in_tune_window_is_inclusive() {
        assert_eq!(classify(440.0, 440.0), DeviationZone::InTune);
        assert_eq!(classify(440.0, 443.0), DeviationZone::InTune);
        assert_eq!(classify(440.0, 437.0), DeviationZone::InTune);
        assert_eq!(classify(440.0, 444.0), DeviationZone::Sharp(Band::Near(1)));
        assert_eq!(classify(440.0, 436.0), DeviationZone::Flat(Band::Near(1)));
    }

    #[test]
    fn bands_are_ordered_outward() {
        assert_eq!(classify(440.0, 446.0), DeviationZone::Sharp(Band::Near(1)));
        assert_eq!(classify(440.0, 447.0), DeviationZone::Sharp(Band::Near(2)));
        assert_eq!(classify(440.0, 449.0), DeviationZone::Sharp(Band::Near(2)));
        assert_eq!(classify(440.0, 451.0), DeviationZone::Sharp(Band::Near(3)));
        assert_eq!(classify(440.0, 454.0), DeviationZone::Sharp(Band::Far));
        assert_eq!(classify(440.0, 455.0), DeviationZone::Sharp(Band::Far));
        assert_eq!(classify(440.0, 430.0), DeviationZone::Flat(Band::Near(3)));
        assert_eq!(classify(440.0, 426.0), DeviationZone::Flat(Band::Far));
    }

    #[test]
    fn saturates_beyond_last_edge() {
        assert_eq!(classify(440.0, 460.0), DeviationZone::Sharp(Band::Very));
        assert_eq!(classify(440.0, 4000.0), DeviationZone::Sharp(Band::Very));
        assert_eq!(classify(440.0, 100.0), DeviationZone::Flat(Band::Very));
    }

    #[test]
    fn unset_target_or_unvoiced_pitch_is_neutral() {
        let bands = ToleranceBands::default();
        assert_eq!(
            bands.classify(&PitchEstimate::voiced(440.0, 0.9), TargetPitch::UNSET),
            DeviationZone::Neutral
        );
        assert_eq!(
            bands.classify(&PitchEstimate::unvoiced(), TargetPitch::hz(440.0)),
            DeviationZone::Neutral
        );
        assert_eq!(TargetPitch::hz(0.0), TargetPitch::UNSET);
        assert_eq!(TargetPitch::hz(f32::NAN), TargetPitch::UNSET);
    }

    #[test]
    fn custom_bands() {
        let bands = ToleranceBands::new(1.0, &[5.0]).unwrap();
        assert_eq!(bands.band_count(), 2);
        assert_eq!(bands.inner_tolerance(), 1.0);
        assert_eq!(bands.zone_for_deviation(0.5), DeviationZone::InTune);
        assert_eq!(bands.zone_for_deviation(-4.0), DeviationZone::Flat(Band::Far));
        assert_eq!(bands.zone_for_deviation(6.0), DeviationZone::Sharp(Band::Very));

        let single = ToleranceBands::new(2.0, &[]).unwrap();
        assert_eq!(single.zone_for_deviation(2.5), DeviationZone::Sharp(Band::Very));
    }

    #[test]
    fn rejects_invalid_edges() {
        assert!(ToleranceBands::new(-1.0, &[3.0]).is_err());
        assert!(ToleranceBands::new(3.0, &[6.0, 6.0]).is_err());
        assert!(ToleranceBands::new(3.0, &[9.0, 6.0]).is_err());
        assert!(ToleranceBands::new(3.0, &[f32::INFINITY]).is_err());
        assert!(ToleranceBands::new(3.0, &[0.0, 6.0]).is_err());
    }

    #[test]
    fn zone_labels() {
        assert_eq!(DeviationZone::Sharp(Band::Near(2)).to_string(), "near sharp 2");
        assert_eq!(DeviationZone::Flat(Band::Very).to_string(), "very flat");
        assert_eq!(DeviationZone::InTune.to_string(), "in tune");
    }
}
