//! Publishing accepted BPM values to the companion app

mod file;
mod messages;
mod pipe;
mod udp;

pub use file::FileSink;
pub use messages::{line_payload, BpmRecord};
pub use pipe::{default_pipe_path, PipeSink};
pub use udp::UdpSink;

use std::net::SocketAddr;
use thiserror::Error;

/// Port the companion app listens on for BPM datagrams
pub const DEFAULT_UDP_TARGET: &str = "127.0.0.1:9955";

/// Output sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to publish to {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode BPM record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which sink to publish through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SinkKind {
    /// JSON file overwritten on every publish
    #[default]
    File,

    /// One datagram per publish
    Udp,

    /// Named pipe (Windows) or Unix datagram socket
    Pipe,
}

/// Where accepted BPM values go
#[derive(Debug)]
pub enum OutputSink {
    File(FileSink),
    Udp(UdpSink),
    Pipe(PipeSink),
}

impl OutputSink {
    pub fn file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::File(FileSink::new(path))
    }

    pub fn udp(target: SocketAddr) -> Self {
        Self::Udp(UdpSink::new(target))
    }

    pub fn pipe(path: impl Into<std::path::PathBuf>) -> Self {
        Self::Pipe(PipeSink::new(path))
    }

    /// Publish one value. Failures are returned to the caller, never retried.
    pub async fn publish(&mut self, bpm: u32) -> Result<(), SinkError> {
        match self {
            Self::File(sink) => sink.publish(bpm).await,
            Self::Udp(sink) => sink.publish(bpm).await,
            Self::Pipe(sink) => sink.publish(bpm).await,
        }
    }

    /// Human-readable destination for log lines
    pub fn describe(&self) -> String {
        match self {
            Self::File(sink) => format!("file {}", sink.path().display()),
            Self::Udp(sink) => format!("udp {}", sink.target()),
            Self::Pipe(sink) => format!("pipe {}", sink.path().display()),
        }
    }
}
