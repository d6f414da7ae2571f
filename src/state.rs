//! Detection session state

use crate::audio::{detect_peaks, envelope, AudioBlock, BandpassFilter, DEFAULT_THRESHOLD_RATIO};
use crate::config::Config;
use crate::tempo::{BpmHistory, BpmSmoother, StabilityGate, TempoEstimator};

/// What one capture cycle produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The band-pass could not be designed, so nothing can be estimated
    FilterUnavailable,

    /// No energy peaks in the block
    NoBeats,

    /// Peaks found, but no plausible tempo between them
    NoTempo { peaks: usize },

    /// A tempo was estimated and folded into the running value
    Tempo {
        peaks: usize,
        raw_bpm: u32,
        bpm: u32,
        publish: bool,
    },
}

/// Everything that persists between capture cycles.
///
/// Owned by the detection loop; nothing here is shared across threads.
pub struct Session {
    filter: Option<BandpassFilter>,
    window_size: usize,
    estimator: TempoEstimator,
    smoother: BpmSmoother,
    history: BpmHistory,
    gate: StabilityGate,
    beat_timestamps: Vec<f64>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let filter = match BandpassFilter::from_config(config) {
            Ok(filter) => Some(filter),
            Err(e) => {
                log::error!("{}; tempo estimation is disabled", e);
                None
            }
        };

        Self {
            filter,
            window_size: config.window_size(),
            estimator: TempoEstimator::from_config(config),
            smoother: BpmSmoother::new(),
            history: BpmHistory::new(),
            gate: StabilityGate::from_config(config),
            beat_timestamps: Vec::new(),
        }
    }

    /// Run one block through the pipeline.
    ///
    /// `now` is the monotonic time in seconds at which the block finished.
    pub fn process_block(&mut self, block: &AudioBlock, now: f64) -> CycleOutcome {
        let Some(filter) = &self.filter else {
            return CycleOutcome::FilterUnavailable;
        };

        let filtered = filter.apply(block);
        let energy = envelope(&filtered, self.window_size);
        let peaks = detect_peaks(&energy, DEFAULT_THRESHOLD_RATIO);
        log::debug!("{} energy windows, {} peaks", energy.len(), peaks.len());

        if peaks.is_empty() {
            return CycleOutcome::NoBeats;
        }

        let reading = self.estimator.estimate(&peaks, now);
        self.beat_timestamps = reading.beat_timestamps;

        let Some(raw_bpm) = reading.bpm else {
            return CycleOutcome::NoTempo { peaks: peaks.len() };
        };

        let bpm = self.smoother.smooth(raw_bpm);
        self.history.push(bpm);

        CycleOutcome::Tempo {
            peaks: peaks.len(),
            raw_bpm,
            bpm,
            publish: self.gate.should_publish(&self.history),
        }
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Beat timestamps retained by the last cycle that found peaks
    pub fn beat_timestamps(&self) -> &[f64] {
        &self.beat_timestamps
    }

    pub fn history(&self) -> &BpmHistory {
        &self.history
    }

    /// Unrounded smoothed BPM, if any tempo has been estimated
    pub fn smoothed_bpm(&self) -> Option<f64> {
        self.smoother.current()
    }
}
