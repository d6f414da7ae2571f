//! Adaptive exponential smoothing of raw BPM readings

/// Jumps larger than this are treated as a tempo change and taken as-is
pub const SNAP_THRESHOLD_BPM: f64 = 35.0;

/// Deviations above this use the fast blend factor
pub const FAST_THRESHOLD_BPM: f64 = 10.0;

/// Blend factor for large deviations
pub const FAST_ALPHA: f64 = 0.7;

/// Blend factor for small jitter
pub const SLOW_ALPHA: f64 = 0.4;

/// Running smoothed tempo.
///
/// Keeps the unrounded value between calls so repeated rounding never
/// accumulates drift.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BpmSmoother {
    previous: Option<f64>,
}

impl BpmSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a raw reading into the running value and return it rounded
    pub fn smooth(&mut self, raw: u32) -> u32 {
        let raw = raw as f64;
        let smoothed = match self.previous {
            None => raw,
            Some(previous) => {
                let diff = (raw - previous).abs();
                if diff > SNAP_THRESHOLD_BPM {
                    raw
                } else {
                    let alpha = if diff > FAST_THRESHOLD_BPM {
                        FAST_ALPHA
                    } else {
                        SLOW_ALPHA
                    };
                    (1.0 - alpha) * previous + alpha * raw
                }
            }
        };

        self.previous = Some(smoothed);
        smoothed.round_ties_even() as u32
    }

    /// Unrounded running value, if any reading has been seen
    pub fn current(&self) -> Option<f64> {
        self.previous
    }
}
