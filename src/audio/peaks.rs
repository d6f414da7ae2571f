//! Beat peak picking on the energy envelope

/// A peak must exceed the envelope mean by this factor
pub const DEFAULT_THRESHOLD_RATIO: f64 = 1.05;

/// Indices of strict local maxima above `mean(energy) * threshold_ratio`.
///
/// The threshold adapts to the whole envelope of the current block. The
/// first and last windows are never candidates.
pub fn detect_peaks(energy: &[f64], threshold_ratio: f64) -> Vec<usize> {
    if energy.len() < 3 {
        return Vec::new();
    }

    let mean = energy.iter().sum::<f64>() / energy.len() as f64;
    let threshold = mean * threshold_ratio;

    energy
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2] && w[1] > threshold)
        .map(|(i, _)| i + 1)
        .collect()
}
