//! Payloads read by the companion app

use serde::{Deserialize, Serialize};

/// Contents of the BPM output file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BpmRecord {
    #[serde(rename = "currentBPM")]
    pub current_bpm: u32,
}

impl BpmRecord {
    pub fn new(bpm: u32) -> Self {
        Self { current_bpm: bpm }
    }
}

/// Newline-terminated decimal BPM, as sent over datagrams and pipes
pub fn line_payload(bpm: u32) -> String {
    format!("{}\n", bpm)
}
