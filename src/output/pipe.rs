//! Local IPC sink: a named pipe on Windows, a Unix datagram socket elsewhere

use super::messages::line_payload;
use super::SinkError;
use std::path::{Path, PathBuf};

/// Pipe the companion app listens on by default
pub fn default_pipe_path() -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(r"\\.\pipe\bpm_pipe")
    }
    #[cfg(not(windows))]
    {
        std::env::temp_dir().join("bpm_pipe.sock")
    }
}

/// Opens the channel, writes one line, and closes it on every publish
#[derive(Debug, Clone)]
pub struct PipeSink {
    path: PathBuf,
}

impl PipeSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            target: self.path.display().to_string(),
            source,
        }
    }

    #[cfg(windows)]
    pub async fn publish(&self, bpm: u32) -> Result<(), SinkError> {
        use tokio::io::AsyncWriteExt;
        use tokio::net::windows::named_pipe::ClientOptions;

        let mut client = ClientOptions::new()
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        client
            .write_all(line_payload(bpm).as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        client.flush().await.map_err(|e| self.io_error(e))
    }

    #[cfg(unix)]
    pub async fn publish(&self, bpm: u32) -> Result<(), SinkError> {
        let socket = tokio::net::UnixDatagram::unbound().map_err(|e| self.io_error(e))?;
        socket
            .send_to(line_payload(bpm).as_bytes(), &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::net::UnixDatagram;

    #[tokio::test]
    async fn publish_sends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bpm_pipe.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();
        let sink = PipeSink::new(&path);

        sink.publish(140).await.unwrap();

        let mut buf = [0u8; 32];
        let n = receiver.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"140\n");
    }

    #[tokio::test]
    async fn missing_listener_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PipeSink::new(dir.path().join("nobody_listening.sock"));

        assert!(matches!(sink.publish(140).await, Err(SinkError::Io { .. })));
    }
}
