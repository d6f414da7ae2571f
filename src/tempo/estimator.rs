//! Raw tempo from the beat peaks of one block

use crate::config::Config;

/// Raw estimates below this fraction of `max_bpm` are candidates for doubling
pub const OCTAVE_FRACTION: f64 = 0.6;

/// Result of one estimation pass
#[derive(Debug, Clone, PartialEq)]
pub struct TempoReading {
    /// Beat timestamps retained for this cycle, oldest first
    pub beat_timestamps: Vec<f64>,

    /// Raw BPM, absent when the peaks gave no plausible interval
    pub bpm: Option<u32>,
}

/// Converts peak window indices into a raw BPM
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimator {
    window_secs: f64,
    consideration_secs: f64,
    min_bpm: f64,
    max_bpm: f64,
}

impl TempoEstimator {
    pub fn new(window_secs: f64, consideration_secs: f64, min_bpm: f64, max_bpm: f64) -> Self {
        Self {
            window_secs,
            consideration_secs,
            min_bpm,
            max_bpm,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.window_secs(),
            config.consideration_secs,
            config.min_bpm,
            config.max_bpm,
        )
    }

    /// Estimate the tempo of the current block.
    ///
    /// `now` is the monotonic time (seconds) the newest peak is anchored to.
    /// The returned timestamps are derived from this block alone; nothing is
    /// carried over from earlier blocks.
    pub fn estimate(&self, peaks: &[usize], now: f64) -> TempoReading {
        let anchored = anchor_timestamps(peaks, self.window_secs, now);
        let beat_timestamps = retain_recent(&anchored, now, self.consideration_secs);

        if beat_timestamps.len() < 2 {
            return TempoReading {
                beat_timestamps,
                bpm: None,
            };
        }

        let intervals = plausible_intervals(&beat_timestamps, self.min_bpm, self.max_bpm);
        if intervals.is_empty() {
            return TempoReading {
                beat_timestamps,
                bpm: None,
            };
        }

        let mean_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let rounded = (60.0 / mean_interval).round_ties_even();
        let bpm = correct_octave(rounded, self.max_bpm);

        TempoReading {
            beat_timestamps,
            bpm: Some(bpm as u32),
        }
    }
}

/// Map peak indices onto a monotonic timeline whose newest peak sits at `now`
pub fn anchor_timestamps(peaks: &[usize], window_secs: f64, now: f64) -> Vec<f64> {
    let Some(&last) = peaks.last() else {
        return Vec::new();
    };
    let last_offset = last as f64 * window_secs;

    peaks
        .iter()
        .map(|&i| now - (last_offset - i as f64 * window_secs))
        .collect()
}

/// Keep timestamps strictly newer than `now - horizon_secs`
pub fn retain_recent(timestamps: &[f64], now: f64, horizon_secs: f64) -> Vec<f64> {
    let cutoff = now - horizon_secs;
    timestamps.iter().copied().filter(|&t| t > cutoff).collect()
}

/// Consecutive differences strictly inside `(60 / max_bpm, 60 / min_bpm)`
pub fn plausible_intervals(timestamps: &[f64], min_bpm: f64, max_bpm: f64) -> Vec<f64> {
    let shortest = 60.0 / max_bpm;
    let longest = 60.0 / min_bpm;

    timestamps
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&interval| interval > shortest && interval < longest)
        .collect()
}

/// Double a slow estimate when the doubled tempo still fits under `max_bpm`.
///
/// Peak picking on the energy envelope tends to lock onto every other beat.
pub fn correct_octave(bpm: f64, max_bpm: f64) -> f64 {
    if bpm > 0.0 && bpm < OCTAVE_FRACTION * max_bpm && bpm * 2.0 <= max_bpm {
        bpm * 2.0
    } else {
        bpm
    }
}
