//! Tempo inference: raw estimation, smoothing, and stability gating

mod estimator;
mod smoother;
mod stability;

pub use estimator::{
    anchor_timestamps, correct_octave, plausible_intervals, retain_recent, TempoEstimator,
    TempoReading,
};
pub use smoother::BpmSmoother;
pub use stability::{BpmHistory, StabilityGate};
