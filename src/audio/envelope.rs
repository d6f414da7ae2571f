//! Energy envelope: per-window RMS of a filtered block

/// Windows peaking above this are rescaled before measuring energy
pub const BLOWUP_GUARD: f64 = 10.0;

/// Split `samples` into `window_size` slices and reduce each to its RMS.
///
/// A trailing partial window is kept. A zero window size yields nothing.
pub fn envelope(samples: &[f64], window_size: usize) -> Vec<f64> {
    if window_size == 0 {
        return Vec::new();
    }

    samples
        .chunks(window_size)
        .filter(|window| !window.is_empty())
        .map(window_energy)
        .collect()
}

/// RMS of one window after folding non-finite samples to zero.
///
/// Only a window whose peak exceeds [`BLOWUP_GUARD`] is normalized by that
/// peak; normal-range audio is measured as-is.
pub fn window_energy(window: &[f64]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }

    let finite = |s: f64| if s.is_finite() { s } else { 0.0 };
    let max_val = window.iter().fold(0.0f64, |acc, &s| acc.max(finite(s).abs()));
    let scale = if max_val > BLOWUP_GUARD { 1.0 / max_val } else { 1.0 };

    let sum_sq: f64 = window
        .iter()
        .map(|&s| {
            let v = finite(s) * scale;
            v * v
        })
        .sum();
    (sum_sq / window.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn window_count_rounds_up() {
        let samples = vec![0.5; 10];

        assert_eq!(envelope(&samples, 3).len(), 4);
        assert_eq!(envelope(&samples, 5).len(), 2);
        assert_eq!(envelope(&samples, 20).len(), 1);
    }

    #[test]
    fn trailing_partial_window_is_measured_on_its_own_length() {
        let samples = [1.0, 1.0, 1.0, 1.0, 0.5];
        let energy = envelope(&samples, 4);

        assert_approx(energy[0], 1.0, 1e-12);
        assert_approx(energy[1], 0.5, 1e-12);
    }

    #[test]
    fn empty_input_and_zero_window_yield_nothing() {
        assert!(envelope(&[], 4).is_empty());
        assert!(envelope(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn non_finite_samples_count_as_silence() {
        let energy = window_energy(&[f64::NAN, f64::INFINITY, 1.0, f64::NEG_INFINITY]);
        assert_approx(energy, 0.5, 1e-12);
    }

    #[test]
    fn normal_range_is_not_rescaled() {
        // Peak of 4 is below the guard, so RMS stays at the raw level
        let energy = window_energy(&[4.0, -4.0, 4.0, -4.0]);
        assert_approx(energy, 4.0, 1e-12);
    }

    #[test]
    fn blown_up_window_is_normalized_by_its_peak() {
        let energy = window_energy(&[100.0, -100.0, 50.0, -50.0]);
        assert_approx(energy, (0.625f64).sqrt(), 1e-12);
    }

    #[test]
    fn energies_are_never_negative() {
        let samples: Vec<f64> = (0..1000).map(|i| ((i as f64) * 0.37).sin() * 3.0 - 1.0).collect();
        assert!(envelope(&samples, 64).iter().all(|&e| e >= 0.0));
    }
}
