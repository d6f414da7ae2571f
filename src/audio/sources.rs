//! Capture device enumeration and preferred-device selection

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// How a device is captured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Output device captured through loopback (system audio)
    Loopback,

    /// Regular input device (microphone, line in, virtual cable)
    Input,
}

/// A device audio can be captured from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureDevice {
    /// Device name as reported by the host
    pub name: String,

    /// Loopback or input capture
    pub kind: DeviceKind,
}

/// Device source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No capture devices available")]
    NoDevices,

    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),

    #[error("Failed to write device preference: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode device preference: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Contents of the device preference file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevicePreference {
    pub preferred_output_device: String,
}

/// List capture devices in selection order.
///
/// The default output device comes first, followed by the remaining output
/// devices (all captured through loopback) and then the input devices.
pub fn list_devices() -> Result<Vec<CaptureDevice>, SourceError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    if let Some(name) = &default_output {
        devices.push(CaptureDevice {
            name: name.clone(),
            kind: DeviceKind::Loopback,
        });
    }

    let outputs = host
        .output_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?;
    for device in outputs {
        if let Ok(name) = device.name() {
            // Skip the default output device (already listed first)
            if default_output.as_deref() == Some(name.as_str()) {
                continue;
            }
            devices.push(CaptureDevice {
                name,
                kind: DeviceKind::Loopback,
            });
        }
    }

    match host.input_devices() {
        Ok(inputs) => {
            for device in inputs {
                if let Ok(name) = device.name() {
                    devices.push(CaptureDevice {
                        name,
                        kind: DeviceKind::Input,
                    });
                }
            }
        }
        Err(e) => {
            log::warn!("Failed to enumerate input devices: {}", e);
        }
    }

    Ok(devices)
}

/// Read the preferred device name, if a readable preference file exists
pub fn load_preference(path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No device preference at {}", path.display());
            return None;
        }
        Err(e) => {
            log::warn!("Failed to read device preference {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<DevicePreference>(&content) {
        Ok(pref) => Some(pref.preferred_output_device),
        Err(e) => {
            log::warn!("Ignoring malformed device preference {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist a device name as the preferred capture device
pub fn save_preference(path: &Path, name: &str) -> Result<(), SourceError> {
    let pref = DevicePreference {
        preferred_output_device: name.to_string(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&pref)?)?;
    Ok(())
}

/// Pick the preferred device if it is currently available, else the first one
pub fn select_device<'a>(
    devices: &'a [CaptureDevice],
    preferred: Option<&str>,
) -> Option<&'a CaptureDevice> {
    if let Some(name) = preferred {
        if let Some(device) = devices.iter().find(|d| d.name == name) {
            return Some(device);
        }
        log::warn!("Preferred device '{}' not found, using the first available", name);
    }
    devices.first()
}
