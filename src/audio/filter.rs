//! Butterworth band-pass filter
//!
//! Design follows the classic digital recipe: analog low-pass prototype,
//! low-pass to band-pass transform, bilinear transform with pre-warped band
//! edges. An order `N` design therefore yields `2N + 1` feed-forward and
//! feed-back coefficients.

use super::AudioBlock;
use crate::config::Config;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;
use thiserror::Error;

/// Order used for the beat band
pub const DEFAULT_ORDER: usize = 2;

/// Make-up gain applied after filtering
pub const OUTPUT_GAIN: f64 = 1.5;

/// Filter design errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error(
        "Invalid filter spec: need 0 < low cut ({low_hz} Hz) < high cut ({high_hz} Hz) \
         < Nyquist ({nyquist_hz} Hz)"
    )]
    InvalidFilterSpec {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },

    #[error("Filter order must be at least 1")]
    ZeroOrder,
}

/// Band-pass IIR coefficients, normalized so `a[0] == 1`
#[derive(Debug, Clone, PartialEq)]
pub struct BandpassFilter {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl BandpassFilter {
    /// Design a Butterworth band-pass of the given order
    pub fn design(
        low_hz: f64,
        high_hz: f64,
        sample_rate: f64,
        order: usize,
    ) -> Result<Self, FilterError> {
        let nyquist_hz = 0.5 * sample_rate;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist_hz) {
            return Err(FilterError::InvalidFilterSpec {
                low_hz,
                high_hz,
                nyquist_hz,
            });
        }
        if order == 0 {
            return Err(FilterError::ZeroOrder);
        }

        // Work at a normalized rate of 2 so the band edges are fractions of Nyquist
        let fs = 2.0;
        let fs2 = 2.0 * fs;
        let warp = |hz: f64| fs2 * (PI * (hz / nyquist_hz) / fs).tan();
        let warped_low = warp(low_hz);
        let warped_high = warp(high_hz);
        let bandwidth = warped_high - warped_low;
        let center = (warped_low * warped_high).sqrt();

        // Analog prototype poles on the left half of the unit circle
        let n = order as f64;
        let prototype: Vec<Complex64> = (0..order)
            .map(|k| {
                let m = -(n - 1.0) + 2.0 * k as f64;
                -Complex64::from_polar(1.0, PI * m / (2.0 * n))
            })
            .collect();

        // Low-pass to band-pass: every prototype pole splits into a pair
        let mut analog_poles = Vec::with_capacity(2 * order);
        for &p in &prototype {
            let scaled = p * (bandwidth / 2.0);
            let offset = (scaled * scaled - center * center).sqrt();
            analog_poles.push(scaled + offset);
        }
        for &p in &prototype {
            let scaled = p * (bandwidth / 2.0);
            let offset = (scaled * scaled - center * center).sqrt();
            analog_poles.push(scaled - offset);
        }
        let analog_gain = bandwidth.powi(order as i32);

        // Bilinear transform: `order` zeros at DC from the band-pass transform
        // map to z = 1, the excess pole degree adds zeros at z = -1
        let fs2_c = Complex64::new(fs2, 0.0);
        let poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (fs2_c + p) / (fs2_c - p))
            .collect();
        let mut zeros = vec![Complex64::new(1.0, 0.0); order];
        zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(order));

        let denom: Complex64 = analog_poles.iter().map(|&p| fs2_c - p).product();
        let gain = analog_gain * (Complex64::new(fs2.powi(order as i32), 0.0) / denom).re;

        let b: Vec<f64> = expand_roots(&zeros).iter().map(|c| c.re * gain).collect();
        let a: Vec<f64> = expand_roots(&poles).iter().map(|c| c.re).collect();

        Ok(Self::normalized(b, a))
    }

    /// Design the beat-band filter described by the configuration
    pub fn from_config(config: &Config) -> Result<Self, FilterError> {
        Self::design(
            config.low_cut_hz,
            config.high_cut_hz,
            config.sample_rate as f64,
            DEFAULT_ORDER,
        )
    }

    fn normalized(mut b: Vec<f64>, mut a: Vec<f64>) -> Self {
        let a0 = a[0];
        if a0 != 1.0 {
            b.iter_mut().for_each(|c| *c /= a0);
            a.iter_mut().for_each(|c| *c /= a0);
        }
        Self { b, a }
    }

    /// Feed-forward coefficients
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Feed-back coefficients
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Filter a block and apply [`OUTPUT_GAIN`]
    pub fn apply(&self, block: &AudioBlock) -> Vec<f64> {
        let mut output = self.filter(block.samples());
        for sample in &mut output {
            *sample *= OUTPUT_GAIN;
        }
        output
    }

    /// Run the raw IIR (direct form II transposed, zero initial state)
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let taps = self.b.len().max(self.a.len());
        let coeff = |c: &[f64], i: usize| c.get(i).copied().unwrap_or(0.0);
        let mut state = vec![0.0f64; taps.saturating_sub(1)];
        let mut output = Vec::with_capacity(input.len());

        for &x in input {
            let y = coeff(&self.b, 0) * x + state.first().copied().unwrap_or(0.0);
            for i in 0..state.len() {
                let next = state.get(i + 1).copied().unwrap_or(0.0);
                state[i] = coeff(&self.b, i + 1) * x + next - coeff(&self.a, i + 1) * y;
            }
            output.push(y);
        }

        output
    }

    /// Complex gain at a normalized angular frequency (radians per sample)
    pub fn response(&self, omega: f64) -> Complex64 {
        let eval = |coeffs: &[f64]| -> Complex64 {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &c)| Complex64::from_polar(c, -omega * k as f64))
                .sum()
        };
        eval(&self.b) / eval(&self.a)
    }
}

/// Polynomial coefficients (highest power first) with the given roots
fn expand_roots(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}
