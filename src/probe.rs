//! Level probing used to pick the device that is actually playing audio

use crate::audio::{rms, CaptureDevice, CaptureError, CaptureHandle};
use std::time::Duration;

/// Devices quieter than this are assumed to be idle
pub const QUIET_THRESHOLD: f32 = 0.01;

/// Audio recorded from each device
pub const PROBE_DURATION: Duration = Duration::from_secs(1);

/// Give up on a device that delivers nothing for this long
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Measured level of one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceLevel {
    pub device: CaptureDevice,
    pub rms: f32,
}

impl DeviceLevel {
    pub fn is_quiet(&self) -> bool {
        self.rms < QUIET_THRESHOLD
    }
}

/// Record one probe's worth of audio from `device` and measure its RMS level
pub async fn probe_device(device: &CaptureDevice, sample_rate: u32) -> Result<f32, CaptureError> {
    let block_len = (sample_rate as f64 * PROBE_DURATION.as_secs_f64()).round() as usize;
    let mut capture = CaptureHandle::start(device, sample_rate, block_len)?;

    let samples = tokio::time::timeout(PROBE_TIMEOUT, capture.next_raw_block())
        .await
        .map_err(|_| CaptureError::Timeout(PROBE_TIMEOUT))??;
    capture.stop();

    Ok(rms(&samples))
}

/// Probe every device in turn. Devices that fail to open are skipped.
pub async fn probe_devices(devices: &[CaptureDevice], sample_rate: u32) -> Vec<DeviceLevel> {
    let mut levels = Vec::with_capacity(devices.len());

    for (i, device) in devices.iter().enumerate() {
        log::info!("Probing {}/{}: {}", i + 1, devices.len(), device.name);
        match probe_device(device, sample_rate).await {
            Ok(rms) => levels.push(DeviceLevel {
                device: device.clone(),
                rms,
            }),
            Err(e) => log::warn!("Skipping '{}': {}", device.name, e),
        }
    }

    rank_levels(&mut levels);
    levels
}

/// Loudest first
pub fn rank_levels(levels: &mut [DeviceLevel]) {
    levels.sort_by(|a, b| b.rms.total_cmp(&a.rms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceKind;

    fn level(name: &str, rms: f32) -> DeviceLevel {
        DeviceLevel {
            device: CaptureDevice {
                name: name.to_string(),
                kind: DeviceKind::Loopback,
            },
            rms,
        }
    }

    #[test]
    fn levels_are_ranked_loudest_first() {
        let mut levels = vec![level("hdmi", 0.0), level("speakers", 0.21), level("usb", 0.03)];
        rank_levels(&mut levels);

        let names: Vec<_> = levels.iter().map(|l| l.device.name.as_str()).collect();
        assert_eq!(names, ["speakers", "usb", "hdmi"]);
    }

    #[test]
    fn quiet_threshold_flags_idle_devices() {
        assert!(level("hdmi", 0.0).is_quiet());
        assert!(level("hdmi", 0.009).is_quiet());
        assert!(!level("speakers", 0.01).is_quiet());
    }
}
