//! # Fast Fourier Transform (FFT) Module
//!
//! FFT helpers for the pitch detector. The YIN difference function is a sum
//! of squared differences over every lag, which is quadratic when computed
//! directly; expanding the square turns it into two running energy sums and
//! one cross-correlation, and the cross-correlation is done here with
//! RustFFT.
//!
//! ## Features
//! - DC offset removal
//! - FFT cross-correlation in `f64` to keep large frames precise
//! - Planner reuse across frames of the same size

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant offset adds the same energy at every lag and flattens the
/// dips YIN looks for, so it is stripped before analysis.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Computes the YIN difference function through FFT cross-correlation.
///
/// Holds an FFT planner so repeated frames of the same length reuse their
/// plans.
pub struct DifferenceFunction {
    planner: FftPlanner<f64>,
}

impl std::fmt::Debug for DifferenceFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifferenceFunction").finish_non_exhaustive()
    }
}

impl Default for DifferenceFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferenceFunction {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Returns `d[tau] = sum_{i < window} (x[i] - x[i + tau])^2` for every
    /// `tau` in `0..=max_lag`.
    ///
    /// # Arguments
    /// * `signal` - At least `window + max_lag` samples
    /// * `window` - Integration window length
    /// * `max_lag` - Largest lag to evaluate
    ///
    /// # Returns
    /// * `Vec<f64>` of length `max_lag + 1`; empty if `signal` is too short
    pub fn compute(&mut self, signal: &[f32], window: usize, max_lag: usize) -> Vec<f64> {
        let span = window + max_lag;
        if window == 0 || signal.len() < span {
            return Vec::new();
        }

        let cross = self.cross_correlation(&signal[..span], window, max_lag);
        let square = |i: usize| {
            let s = signal[i] as f64;
            s * s
        };

        // d(tau) = e(0) + e(tau) - 2 r(tau), with e(tau) the energy of the
        // window starting at tau.
        let head_energy: f64 = (0..window).map(square).sum();
        let mut shifted_energy = head_energy;
        let mut diff = Vec::with_capacity(max_lag + 1);
        for (tau, r) in cross.iter().enumerate() {
            diff.push((head_energy + shifted_energy - 2.0 * r).max(0.0));
            if tau < max_lag {
                shifted_energy += square(tau + window) - square(tau);
            }
        }
        diff
    }

    /// `r[tau] = sum_{i < window} x[i] * x[i + tau]` for `tau` in `0..=max_lag`.
    fn cross_correlation(&mut self, signal: &[f32], window: usize, max_lag: usize) -> Vec<f64> {
        // No circular wrap as long as the transform covers window + max_lag.
        let size = (window + max_lag).next_power_of_two();
        let forward = self.planner.plan_fft_forward(size);
        let inverse = self.planner.plan_fft_inverse(size);

        let mut head: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); size];
        for (slot, &s) in head.iter_mut().zip(&signal[..window]) {
            slot.re = s as f64;
        }
        let mut full: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); size];
        for (slot, &s) in full.iter_mut().zip(signal) {
            slot.re = s as f64;
        }

        forward.process(&mut head);
        forward.process(&mut full);
        for (f, h) in full.iter_mut().zip(&head) {
            *f *= h.conj();
        }
        inverse.process(&mut full);

        // RustFFT leaves the inverse unnormalized.
        let scale = 1.0 / size as f64;
        full.iter().take(max_lag + 1).map(|c| c.re * scale).collect()
    }
}
