//! Pause signalling from the companion app
//!
//! The companion app can suspend detection either by writing a flag file
//! (polled every few seconds) or, when embedded in the same process, by
//! toggling a [`PauseToken`].

use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often the pause signal is re-read
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Pause signal errors
#[derive(Error, Debug)]
pub enum PauseError {
    #[error("Failed to read pause flag {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed pause flag {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Something that can say whether detection should be paused
pub trait PauseSignal {
    fn read(&self) -> Result<bool, PauseError>;
}

/// Pause flag stored as JSON in a file. A missing file means "not paused".
#[derive(Debug, Clone)]
pub struct FilePauseSignal {
    path: PathBuf,
}

impl FilePauseSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PauseSignal for FilePauseSignal {
    fn read(&self) -> Result<bool, PauseError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(PauseError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value: Value = serde_json::from_str(&content).map_err(|source| PauseError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(flag_is_set(&value))
    }
}

/// `true`, `1`, or any string spelling "true" in any case
fn flag_is_set(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.to_lowercase() == "true",
        _ => false,
    }
}

/// In-process pause switch shared between the owner and the detection loop
#[derive(Debug, Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl PauseSignal for PauseToken {
    fn read(&self) -> Result<bool, PauseError> {
        Ok(self.is_paused())
    }
}

/// Paused when either signal says so
impl<A: PauseSignal, B: PauseSignal> PauseSignal for (A, B) {
    fn read(&self) -> Result<bool, PauseError> {
        match (self.0.read(), self.1.read()) {
            (Ok(true), _) | (_, Ok(true)) => Ok(true),
            (Err(e), _) | (_, Err(e)) => Err(e),
            _ => Ok(false),
        }
    }
}

/// A change of pause state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTransition {
    Paused,
    Resumed,
}

/// Caches the pause state and re-reads the signal at a fixed interval
pub struct PauseController<S> {
    signal: S,
    interval: Duration,
    paused: bool,
    last_poll: Option<Instant>,
    /// Consecutive polls whose read failed; only the first is logged
    failed_reads: u32,
}

impl<S: PauseSignal> PauseController<S> {
    pub fn new(signal: S) -> Self {
        Self::with_interval(signal, PAUSE_POLL_INTERVAL)
    }

    pub fn with_interval(signal: S, interval: Duration) -> Self {
        Self {
            signal,
            interval,
            paused: false,
            last_poll: None,
            failed_reads: 0,
        }
    }

    /// Re-read the signal if the poll interval has elapsed.
    ///
    /// Returns a transition only when the cached state changes. A read
    /// failure counts as "not paused" and is logged once per failure streak.
    pub fn poll(&mut self, now: Instant) -> Option<PauseTransition> {
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_poll = Some(now);

        let paused = match self.signal.read() {
            Ok(paused) => {
                self.failed_reads = 0;
                paused
            }
            Err(e) => {
                self.failed_reads = self.failed_reads.saturating_add(1);
                if self.failed_reads == 1 {
                    log::warn!("{}; treating as not paused", e);
                }
                false
            }
        };

        if paused == self.paused {
            return None;
        }
        self.paused = paused;

        if paused {
            log::info!("BPM detection paused");
            Some(PauseTransition::Paused)
        } else {
            log::info!("BPM detection resumed");
            Some(PauseTransition::Resumed)
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSignal;

    /// Fails while `broken` is set, otherwise reports "not paused"
    struct SwitchableSignal {
        broken: Arc<AtomicBool>,
    }

    impl PauseSignal for SwitchableSignal {
        fn read(&self) -> Result<bool, PauseError> {
            if self.broken.load(Ordering::Relaxed) {
                BrokenSignal.read()
            } else {
                Ok(false)
            }
        }
    }

    impl PauseSignal for BrokenSignal {
        fn read(&self) -> Result<bool, PauseError> {
            Err(PauseError::Read {
                path: PathBuf::from("pause_flag.json"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
            })
        }
    }

    fn flag_file(content: Option<&str>) -> (tempfile::TempDir, FilePauseSignal) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pause_flag.json");
        if let Some(content) = content {
            std::fs::write(&path, content).unwrap();
        }
        (dir, FilePauseSignal::new(path))
    }

    #[test]
    fn missing_file_is_not_paused() {
        let (_dir, signal) = flag_file(None);
        assert!(!signal.read().unwrap());
    }

    #[test]
    fn file_values_are_interpreted() {
        for (content, expected) in [
            ("true", true),
            ("false", false),
            (r#""TRUE""#, true),
            (r#""True""#, true),
            (r#""no""#, false),
            ("1", true),
            ("0", false),
            ("null", false),
            (r#"{"paused": true}"#, false),
        ] {
            let (_dir, signal) = flag_file(Some(content));
            assert_eq!(signal.read().unwrap(), expected, "content {}", content);
        }
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_dir, signal) = flag_file(Some("{not json"));
        assert!(matches!(signal.read(), Err(PauseError::Parse { .. })));
    }

    #[test]
    fn token_toggles_across_clones() {
        let token = PauseToken::new();
        let remote = token.clone();

        assert!(!token.read().unwrap());
        remote.pause();
        assert!(token.read().unwrap());
        remote.resume();
        assert!(!token.is_paused());
    }

    #[test]
    fn combined_signal_pauses_if_either_is_set() {
        let (_dir, file) = flag_file(None);
        let token = PauseToken::new();
        let combined = (file, token.clone());

        assert!(!combined.read().unwrap());
        token.pause();
        assert!(combined.read().unwrap());

        let with_broken = (BrokenSignal, token.clone());
        assert!(with_broken.read().unwrap());
        token.resume();
        assert!(with_broken.read().is_err());
    }

    #[test]
    fn transitions_are_reported_once() {
        let token = PauseToken::new();
        let mut controller = PauseController::new(token.clone());
        let start = Instant::now();

        assert_eq!(controller.poll(start), None);

        token.pause();
        assert_eq!(
            controller.poll(start + PAUSE_POLL_INTERVAL),
            Some(PauseTransition::Paused)
        );
        assert!(controller.is_paused());
        assert_eq!(controller.poll(start + PAUSE_POLL_INTERVAL * 2), None);

        token.resume();
        assert_eq!(
            controller.poll(start + PAUSE_POLL_INTERVAL * 3),
            Some(PauseTransition::Resumed)
        );
        assert!(!controller.is_paused());
    }

    #[test]
    fn signal_is_not_reread_before_interval() {
        let token = PauseToken::new();
        let mut controller = PauseController::new(token.clone());
        let start = Instant::now();
        controller.poll(start);

        token.pause();
        assert_eq!(controller.poll(start + Duration::from_secs(1)), None);
        assert!(!controller.is_paused());
        assert_eq!(
            controller.poll(start + Duration::from_secs(3)),
            Some(PauseTransition::Paused)
        );
    }

    #[test]
    fn read_failure_counts_as_not_paused() {
        let mut controller = PauseController::with_interval(BrokenSignal, Duration::ZERO);
        assert_eq!(controller.poll(Instant::now()), None);
        assert!(!controller.is_paused());
    }

    #[test]
    fn read_failure_is_reported_once_per_streak() {
        let broken = Arc::new(AtomicBool::new(true));
        let signal = SwitchableSignal {
            broken: broken.clone(),
        };
        let mut controller = PauseController::with_interval(signal, Duration::ZERO);
        let now = Instant::now();

        for _ in 0..3 {
            controller.poll(now);
        }
        // Only the first failure of the streak is logged
        assert_eq!(controller.failed_reads, 3);

        broken.store(false, Ordering::Relaxed);
        controller.poll(now);
        assert_eq!(controller.failed_reads, 0);

        broken.store(true, Ordering::Relaxed);
        controller.poll(now);
        assert_eq!(controller.failed_reads, 1);
        assert!(!controller.is_paused());
    }
}
