//! # Pitch Detection Module
//!
//! Fundamental-frequency estimation with the YIN algorithm (de Cheveigné &
//! Kawahara, 2002), tuned for plucked and bowed strings.
//!
//! ## Features
//! - YIN cumulative mean normalized difference with an absolute threshold
//! - First-dip search to avoid octave errors
//! - Parabolic interpolation for sub-sample accuracy
//! - Amplitude gating to filter out silence
//! - Explicit unvoiced result instead of a guessed frequency

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, TunerError};
use crate::fft::{DifferenceFunction, remove_dc_offset};
use crate::level::rms;
use crate::window::AudioFrame;

/// Outcome of pitch detection for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz; 0 when unvoiced.
    pub frequency_hz: f32,
    /// `1 - d'(tau)` at the chosen lag, in [0, 1].
    pub confidence: f32,
    /// False when the frame held no reliable pitch (silence, noise, bad input).
    pub is_voiced: bool,
}

impl PitchEstimate {
    /// The "no reliable pitch" outcome.
    pub fn unvoiced() -> Self {
        Self::default()
    }

    pub fn voiced(frequency_hz: f32, confidence: f32) -> Self {
        Self {
            frequency_hz,
            confidence,
            is_voiced: true,
        }
    }

    /// The frequency, if the estimate is usable.
    pub fn frequency(&self) -> Option<f32> {
        (self.is_voiced && self.frequency_hz > 0.0).then_some(self.frequency_hz)
    }
}

/// YIN pitch detector.
#[derive(Debug)]
pub struct YinDetector {
    threshold: f32,
    min_confidence: f32,
    amplitude_threshold: f32,
    min_frequency_hz: f32,
    max_frequency_hz: f32,
    difference: DifferenceFunction,
}

impl YinDetector {
    /// Creates a detector searching fundamentals in
    /// `[min_frequency_hz, max_frequency_hz]`.
    ///
    /// # Errors
    /// * `InvalidConfig` if the threshold is outside (0, 1) or the frequency
    ///   range is empty or non-finite
    pub fn new(threshold: f32, min_frequency_hz: f32, max_frequency_hz: f32) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(TunerError::config(format!(
                "yin_threshold must be in (0, 1), got {threshold}"
            )));
        }
        if !(min_frequency_hz.is_finite() && min_frequency_hz > 0.0) {
            return Err(TunerError::config("min_frequency_hz must be positive"));
        }
        if !(max_frequency_hz.is_finite() && max_frequency_hz > min_frequency_hz) {
            return Err(TunerError::config(
                "max_frequency_hz must be greater than min_frequency_hz",
            ));
        }
        Ok(Self {
            threshold,
            min_confidence: 0.0,
            amplitude_threshold: 0.0,
            min_frequency_hz,
            max_frequency_hz,
            difference: DifferenceFunction::new(),
        })
    }

    /// Estimates below this confidence are reported as unvoiced.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(TunerError::config(format!(
                "min_confidence must be in [0, 1], got {min_confidence}"
            )));
        }
        self.min_confidence = min_confidence;
        Ok(self)
    }

    /// Frames with a lower RMS are unvoiced without running YIN.
    pub fn with_amplitude_threshold(mut self, amplitude_threshold: f32) -> Result<Self> {
        if !(amplitude_threshold.is_finite() && amplitude_threshold >= 0.0) {
            return Err(TunerError::config(
                "amplitude_threshold must be a non-negative number",
            ));
        }
        self.amplitude_threshold = amplitude_threshold;
        Ok(self)
    }

    /// Builds the detector and checks that the configured frame can hold the
    /// lag range at the configured sample rate.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let detector = Self::new(
            config.yin_threshold,
            config.min_frequency_hz,
            config.max_frequency_hz,
        )?
        .with_min_confidence(config.min_confidence)?
        .with_amplitude_threshold(config.amplitude_threshold)?;

        let nyquist = config.sample_rate as f32 / 2.0;
        if config.max_frequency_hz >= nyquist {
            return Err(TunerError::config(format!(
                "max_frequency_hz ({}) must be below the Nyquist frequency ({nyquist})",
                config.max_frequency_hz
            )));
        }
        let required = detector.required_frame_size(config.sample_rate);
        if config.frame_size < required {
            return Err(TunerError::config(format!(
                "frame_size ({}) must be at least {required} samples to reach {} Hz",
                config.frame_size, config.min_frequency_hz
            )));
        }
        Ok(detector)
    }

    /// Smallest and largest lag (in samples) searched at `sample_rate`.
    pub fn lag_range(&self, sample_rate: u32) -> (usize, usize) {
        let rate = sample_rate as f32;
        let min_lag = ((rate / self.max_frequency_hz).floor() as usize).max(2);
        let max_lag = (rate / self.min_frequency_hz).ceil() as usize;
        (min_lag, max_lag)
    }

    /// Frames must span twice the largest lag.
    pub fn required_frame_size(&self, sample_rate: u32) -> usize {
        2 * self.lag_range(sample_rate).1
    }

    /// Runs YIN over one frame.
    ///
    /// Never fails: frames that are too short, silent, contain NaN/Inf, or
    /// have no lag under the threshold all come back unvoiced.
    pub fn detect(&mut self, frame: &AudioFrame) -> PitchEstimate {
        let sample_rate = frame.sample_rate();
        if sample_rate == 0 {
            return PitchEstimate::unvoiced();
        }
        let (min_lag, max_lag) = self.lag_range(sample_rate);
        if min_lag >= max_lag || frame.len() < 2 * max_lag {
            tracing::trace!(len = frame.len(), max_lag, "frame too short for lag range");
            return PitchEstimate::unvoiced();
        }
        if frame.samples().iter().any(|s| !s.is_finite()) {
            return PitchEstimate::unvoiced();
        }

        let mut signal = frame.samples().to_vec();
        remove_dc_offset(&mut signal);

        // --- Noise gate ---
        let level = rms(&signal);
        if level <= 0.0 || level < self.amplitude_threshold {
            return PitchEstimate::unvoiced();
        }

        // --- Step 1 & 2: Difference function ---
        let window = signal.len() - max_lag;
        let diff = self.difference.compute(&signal, window, max_lag);
        if diff.len() != max_lag + 1 {
            return PitchEstimate::unvoiced();
        }

        // --- Step 3: Cumulative mean normalized difference ---
        let cmnd = cumulative_mean_normalized(&diff);

        // --- Step 4: Absolute threshold, then slide down to the dip ---
        let Some(tau) = first_dip(&cmnd, max_lag, self.threshold as f64) else {
            return PitchEstimate::unvoiced();
        };
        if tau < min_lag {
            // Above max_frequency_hz; later dips are sub-harmonics.
            tracing::trace!(tau, min_lag, "pitch above the frequency range");
            return PitchEstimate::unvoiced();
        }

        // --- Step 5: Parabolic interpolation ---
        let refined = tau as f64 + parabolic_shift(cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
        let frequency = (sample_rate as f64 / refined) as f32;
        let confidence = (1.0 - cmnd[tau]).clamp(0.0, 1.0) as f32;

        if !frequency.is_finite() || frequency <= 0.0 {
            return PitchEstimate::unvoiced();
        }
        if confidence < self.min_confidence {
            return PitchEstimate {
                frequency_hz: 0.0,
                confidence,
                is_voiced: false,
            };
        }
        PitchEstimate::voiced(frequency, confidence)
    }
}

/// `d'(0) = 1`, `d'(tau) = d(tau) * tau / sum_{j=1..tau} d(j)`.
fn cumulative_mean_normalized(diff: &[f64]) -> Vec<f64> {
    let mut cmnd = vec![1.0; diff.len()];
    let mut running_sum = 0.0;
    for tau in 1..diff.len() {
        running_sum += diff[tau];
        cmnd[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f64 / running_sum
        } else {
            1.0
        };
    }
    cmnd
}

/// First lag in `[2, max_lag)` under `threshold`, moved forward to the
/// bottom of its dip. `None` if nothing crosses the threshold.
fn first_dip(cmnd: &[f64], max_lag: usize, threshold: f64) -> Option<usize> {
    let mut tau = (2..max_lag).find(|&tau| cmnd[tau] < threshold)?;
    while tau + 1 < max_lag && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }
    Some(tau)
}

/// Offset of the vertex of the parabola through three equally spaced
/// points, in [-0.5, 0.5]; 0 when the points do not form a minimum.
fn parabolic_shift(y1: f64, y2: f64, y3: f64) -> f64 {
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    ((y1 - y3) / (2.0 * denominator)).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44_100;

    fn sine(freq: f32, len: usize, amplitude: f32) -> AudioFrame {
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect();
        AudioFrame::new(samples, RATE)
    }

    /// Deterministic uniform noise in [-amplitude, amplitude].
    fn noise(len: usize, amplitude: f32, mut seed: u32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                (seed as f32 / u32::MAX as f32 * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn detector() -> YinDetector {
        YinDetector::from_config(&EngineConfig {
            frame_size: 2048,
            hop_size: 512,
            ..Default::default()
        })
        .unwrap()
    }

    fn assert_within(estimate: PitchEstimate, expected: f32) {
        assert!(estimate.is_voiced, "expected a pitch near {expected} Hz");
        let error = (estimate.frequency_hz - expected).abs() / expected;
        assert!(
            error < 0.005,
            "detected {} Hz for {expected} Hz ({:.3}% off)",
            estimate.frequency_hz,
            error * 100.0
        );
    }

    #[test]
    fn detects_sine_waves() {
        let mut yin = detector();
        for freq in [440.0, 110.0, 82.41, 196.0, 329.63] {
            assert_within(yin.detect(&sine(freq, 2048, 0.5)), freq);
        }
    }

    #[test]
    fn detects_with_larger_frames() {
        let mut yin = YinDetector::from_config(&EngineConfig::default()).unwrap();
        assert_within(yin.detect(&sine(146.83, 4096, 0.3)), 146.83);
    }

    #[test]
    fn harmonic_tone_reports_the_fundamental() {
        let samples: Vec<f32> = (0..2048)
            .map(|i| {
                let t = 2.0 * std::f32::consts::PI * 110.0 * i as f32 / RATE as f32;
                0.4 * t.sin() + 0.3 * (2.0 * t).sin() + 0.2 * (3.0 * t).sin()
            })
            .collect();
        assert_within(detector().detect(&AudioFrame::new(samples, RATE)), 110.0);
    }

    #[test]
    fn tones_near_the_upper_limit_are_detected() {
        let mut yin = YinDetector::from_config(&EngineConfig::default()).unwrap();
        assert_within(yin.detect(&sine(1000.0, 4096, 0.5)), 1000.0);
    }

    #[test]
    fn tones_above_the_range_are_unvoiced() {
        let mut yin = YinDetector::from_config(&EngineConfig::default()).unwrap();
        for freq in [1600.0, 2000.0, 3000.0] {
            let estimate = yin.detect(&sine(freq, 4096, 0.5));
            assert!(!estimate.is_voiced, "{freq} Hz reported as {} Hz", estimate.frequency_hz);
            assert_eq!(estimate.frequency(), None);
        }
    }

    #[test]
    fn first_dip_slides_to_the_bottom() {
        let cmnd = [1.0, 1.0, 0.9, 0.12, 0.05, 0.08, 0.01];
        assert_eq!(first_dip(&cmnd, 6, 0.15), Some(4));
        assert_eq!(first_dip(&cmnd, 3, 0.15), None);
    }

    #[test]
    fn confidence_is_high_for_a_clean_tone() {
        let estimate = detector().detect(&sine(440.0, 2048, 0.5));
        assert!(estimate.confidence > 0.9);
        assert!(estimate.confidence <= 1.0);
    }

    #[test]
    fn silence_is_unvoiced() {
        let estimate = detector().detect(&AudioFrame::new(vec![0.0; 2048], RATE));
        assert_eq!(estimate, PitchEstimate::unvoiced());
        assert_eq!(estimate.frequency(), None);
    }

    #[test]
    fn constant_offset_is_unvoiced() {
        let estimate = detector().detect(&AudioFrame::new(vec![0.25; 2048], RATE));
        assert!(!estimate.is_voiced);
    }

    #[test]
    fn white_noise_is_unvoiced() {
        let frame = AudioFrame::new(noise(2048, 0.5, 0x1234_5678), RATE);
        assert!(!detector().detect(&frame).is_voiced);
    }

    #[test]
    fn short_frame_is_unvoiced() {
        // 60 Hz needs 2 * 735 samples.
        assert!(!detector().detect(&sine(440.0, 1024, 0.5)).is_voiced);
    }

    #[test]
    fn non_finite_samples_are_unvoiced() {
        let mut samples = sine(440.0, 2048, 0.5).samples().to_vec();
        samples[100] = f32::NAN;
        assert!(!detector().detect(&AudioFrame::new(samples, RATE)).is_voiced);

        let mut samples = sine(440.0, 2048, 0.5).samples().to_vec();
        samples[7] = f32::INFINITY;
        assert!(!detector().detect(&AudioFrame::new(samples, RATE)).is_voiced);
    }

    #[test]
    fn amplitude_gate_rejects_quiet_frames() {
        let mut yin = detector().with_amplitude_threshold(0.1).unwrap();
        assert!(!yin.detect(&sine(440.0, 2048, 0.01)).is_voiced);
        assert!(yin.detect(&sine(440.0, 2048, 0.5)).is_voiced);
    }

    #[test]
    fn confidence_floor_rejects_noisy_estimates() {
        let tone = sine(220.0, 2048, 0.5);
        let hiss = noise(2048, 0.05, 42);
        let samples: Vec<f32> = tone.samples().iter().zip(&hiss).map(|(a, b)| a + b).collect();
        let frame = AudioFrame::new(samples, RATE);

        let lenient = detector().detect(&frame);
        assert!(lenient.is_voiced);
        assert!((lenient.frequency_hz - 220.0).abs() < 4.0);
        assert!(lenient.confidence < 0.999);

        let strict = detector().with_min_confidence(0.999).unwrap().detect(&frame);
        assert!(!strict.is_voiced);
        assert_eq!(strict.frequency(), None);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(YinDetector::new(0.0, 60.0, 1500.0).is_err());
        assert!(YinDetector::new(1.0, 60.0, 1500.0).is_err());
        assert!(YinDetector::new(0.1, 0.0, 1500.0).is_err());
        assert!(YinDetector::new(0.1, 500.0, 400.0).is_err());
        assert!(detector().with_min_confidence(1.5).is_err());
        assert!(detector().with_amplitude_threshold(-1.0).is_err());
    }

    #[test]
    fn lag_range_follows_frequency_limits() {
        let yin = YinDetector::new(0.15, 60.0, 1500.0).unwrap();
        assert_eq!(yin.lag_range(RATE), (29, 735));
        assert_eq!(yin.required_frame_size(RATE), 1470);
    }

    #[test]
    fn parabola_vertex() {
        assert_eq!(parabolic_shift(1.0, 0.0, 1.0), 0.0);
        assert!((parabolic_shift(2.0, 0.5, 1.0) - 0.25).abs() < 1e-12);
        assert_eq!(parabolic_shift(1.0, 2.0, 1.0), 0.0);
    }
}
