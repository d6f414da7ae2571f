//! Publish gating based on recent BPM history

use crate::config::Config;
use std::collections::VecDeque;

/// Only the two most recent values influence stability
pub const HISTORY_CAPACITY: usize = 2;

/// Recently accepted smoothed BPM values, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BpmHistory {
    values: VecDeque<u32>,
}

impl BpmHistory {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, bpm: u32) {
        if self.values.len() == HISTORY_CAPACITY {
            self.values.pop_front();
        }
        self.values.push_back(bpm);
    }

    /// Newest value and the one before it
    pub fn last_two(&self) -> Option<(u32, u32)> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }
        Some((self.values[n - 2], self.values[n - 1]))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<u32> for BpmHistory {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut history = Self::new();
        for bpm in iter {
            history.push(bpm);
        }
        history
    }
}

/// Decides whether the current smoothed BPM is trustworthy
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityGate {
    require_stability: bool,
    tolerance_bpm: f64,
}

impl StabilityGate {
    pub fn new(require_stability: bool, tolerance_bpm: f64) -> Self {
        Self {
            require_stability,
            tolerance_bpm,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.require_stability, config.stability_tolerance_bpm)
    }

    /// With fewer than two values stability cannot be judged, so the answer
    /// falls back to the policy: permissive unless stability is required.
    pub fn is_stable(&self, history: &BpmHistory) -> bool {
        match history.last_two() {
            None => !self.require_stability,
            Some((previous, latest)) => {
                (latest as f64 - previous as f64).abs() <= self.tolerance_bpm
            }
        }
    }

    /// Whether the newest value should reach the output sink
    pub fn should_publish(&self, history: &BpmHistory) -> bool {
        !self.require_stability || self.is_stable(history)
    }
}
