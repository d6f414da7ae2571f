//! Audio capture and beat-band analysis

mod block;
mod capture;
mod envelope;
mod filter;
mod peaks;
mod sources;

use std::future::Future;

pub use block::{downmix, rms, AudioBlock};
pub use capture::{BlockBuffer, CaptureError, CaptureHandle};
pub use envelope::{envelope, window_energy, BLOWUP_GUARD};
pub use filter::{BandpassFilter, FilterError, DEFAULT_ORDER, OUTPUT_GAIN};
pub use peaks::{detect_peaks, DEFAULT_THRESHOLD_RATIO};
pub use sources::{
    list_devices, load_preference, save_preference, select_device, CaptureDevice, DeviceKind,
    DevicePreference, SourceError,
};

/// Anything that hands out fixed-length blocks of audio.
///
/// `next_block` may wait for as long as one capture cycle and must be cancel
/// safe. `Ok(None)` means the source is exhausted and no more blocks will come.
pub trait BlockSource {
    fn next_block(&mut self) -> impl Future<Output = Result<Option<AudioBlock>, CaptureError>>;
}
