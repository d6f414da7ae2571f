//! Audio capture implementation using a dedicated thread

use super::{downmix, AudioBlock, BlockSource, CaptureDevice, DeviceKind};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How often a waiting consumer checks the buffer for a complete block
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Completed blocks kept before the oldest audio is discarded
pub const BUFFERED_BLOCKS: usize = 2;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Thread error: {0}")]
    ThreadError(String),

    #[error("Audio stream ended")]
    StreamEnded,

    #[error("No audio received within {0:?}")]
    Timeout(Duration),
}

/// Commands sent to the audio thread
enum CaptureCommand {
    Stop,
}

/// Linear-interpolation resampler that keeps its phase across callbacks.
///
/// `position` is where the next output sample falls, measured in input
/// samples from the start of the next chunk. It lies in `[-1, 0)` when that
/// sample sits between the previous chunk's last sample and the next chunk's
/// first.
#[derive(Debug, Clone)]
struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    position: f64,
    last: Option<f32>,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            position: 0.0,
            last: None,
        }
    }

    /// Append the resampled form of `input` to `out`
    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() || self.from_rate == 0 || self.to_rate == 0 {
            return;
        }
        if self.from_rate == self.to_rate {
            out.extend_from_slice(input);
            return;
        }

        let ratio = self.from_rate as f64 / self.to_rate as f64;
        let len = input.len() as f64;
        let first = input[0];

        while self.position.floor() + 1.0 < len {
            let base = self.position.floor();
            let frac = (self.position - base) as f32;
            let (a, b) = if base < 0.0 {
                (self.last.unwrap_or(first), first)
            } else {
                let idx = base as usize;
                (input[idx], input[idx + 1])
            };
            out.push(a + (b - a) * frac);
            self.position += ratio;
        }

        self.position -= len;
        self.last = input.last().copied();
    }
}

/// Mono samples at the analysis rate, waiting to be cut into blocks.
///
/// Incoming audio is resampled from the device rate on push. Once more than
/// `capacity` samples are pending the oldest are dropped, so a slow consumer
/// always sees recent audio.
pub struct BlockBuffer {
    pending: Vec<f32>,
    resampler: LinearResampler,
    capacity: usize,
    dropped: u64,
}

impl BlockBuffer {
    pub fn new(source_rate: u32, target_rate: u32, capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity),
            resampler: LinearResampler::new(source_rate, target_rate),
            capacity,
            dropped: 0,
        }
    }

    pub fn push_mono(&mut self, mono: &[f32]) {
        self.resampler.process(mono, &mut self.pending);

        if self.pending.len() > self.capacity {
            let overflow = self.pending.len() - self.capacity;
            self.pending.drain(..overflow);
            self.dropped += overflow as u64;
        }
    }

    /// Remove and return the oldest `len` samples once that many are pending
    pub fn take_block(&mut self, len: usize) -> Option<Vec<f32>> {
        if len == 0 || self.pending.len() < len {
            return None;
        }
        Some(self.pending.drain(..len).collect())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Samples discarded because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Audio capture handle
///
/// The cpal stream is not Send, so a dedicated thread owns it for its whole
/// life. The handle only holds the command channel and the shared buffer.
pub struct CaptureHandle {
    /// Command sender to control the audio thread
    command_tx: mpsc::Sender<CaptureCommand>,

    /// Handle to the audio thread
    thread_handle: Option<JoinHandle<()>>,

    /// Resampled mono audio (shared with the stream callback)
    buffer: Arc<Mutex<BlockBuffer>>,

    /// Set by the stream error callback
    failed: Arc<AtomicBool>,

    block_len: usize,
}

impl CaptureHandle {
    /// Open `device` and start streaming blocks of `block_len` samples at
    /// `target_rate`. Returns once the stream is playing or has failed to start.
    pub fn start(
        device: &CaptureDevice,
        target_rate: u32,
        block_len: usize,
    ) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let capacity = block_len.saturating_mul(BUFFERED_BLOCKS);
        let buffer = Arc::new(Mutex::new(BlockBuffer::new(target_rate, target_rate, capacity)));
        let failed = Arc::new(AtomicBool::new(false));

        let device = device.clone();
        let buffer_clone = buffer.clone();
        let failed_clone = failed.clone();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                run_capture_thread(
                    device,
                    target_rate,
                    command_rx,
                    ready_tx,
                    buffer_clone,
                    failed_clone,
                )
            })
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(CaptureError::ThreadError(
                    "audio thread exited during startup".to_string(),
                ));
            }
        }

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
            buffer,
            failed,
            block_len,
        })
    }

    /// Wait for the next complete block of raw mono samples
    pub async fn next_raw_block(&mut self) -> Result<Vec<f32>, CaptureError> {
        loop {
            let block = self.buffer.lock().take_block(self.block_len);
            if let Some(block) = block {
                return Ok(block);
            }

            let thread_gone = self
                .thread_handle
                .as_ref()
                .map_or(true, |handle| handle.is_finished());
            if self.failed.load(Ordering::Relaxed) || thread_gone {
                return Err(CaptureError::StreamEnded);
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop the audio capture
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(CaptureCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();

            let dropped = self.buffer.lock().dropped();
            if dropped > 0 {
                log::debug!("Capture discarded {} samples while the analyzer was busy", dropped);
            }
        }
    }
}

impl BlockSource for CaptureHandle {
    async fn next_block(&mut self) -> Result<Option<AudioBlock>, CaptureError> {
        let raw = self.next_raw_block().await?;
        Ok(Some(AudioBlock::from_mono(&raw)))
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the audio capture in a dedicated thread
fn run_capture_thread(
    device: CaptureDevice,
    target_rate: u32,
    command_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: mpsc::Sender<Result<(), CaptureError>>,
    buffer: Arc<Mutex<BlockBuffer>>,
    failed: Arc<AtomicBool>,
) {
    let stream = match open_stream(&device, target_rate, buffer, failed) {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("Audio thread error: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::PlayError(e.to_string())));
        return;
    }

    log::info!("Audio capture started on '{}'", device.name);
    let _ = ready_tx.send(Ok(()));

    // The callback does all the work; this thread just keeps the stream alive
    match command_rx.recv() {
        Ok(CaptureCommand::Stop) => log::info!("Audio capture stopping"),
        Err(_) => log::info!("Audio capture channel disconnected"),
    }

    drop(stream);
}

/// Look up a device by name among outputs (loopback) or inputs
fn find_device(host: &cpal::Host, device: &CaptureDevice) -> Result<Device, CaptureError> {
    let mut devices: Box<dyn Iterator<Item = Device>> = match device.kind {
        DeviceKind::Loopback => Box::new(
            host.output_devices()
                .map_err(|e| CaptureError::ConfigError(e.to_string()))?,
        ),
        DeviceKind::Input => Box::new(
            host.input_devices()
                .map_err(|e| CaptureError::ConfigError(e.to_string()))?,
        ),
    };

    devices
        .find(|d| d.name().map(|n| n == device.name).unwrap_or(false))
        .ok_or_else(|| CaptureError::DeviceNotFound(device.name.clone()))
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::I32 | SampleFormat::U16
    )
}

/// Prefer a config running at the analysis rate; otherwise take the device
/// default and resample.
fn choose_config(
    device: &Device,
    kind: DeviceKind,
    target_rate: u32,
) -> Result<SupportedStreamConfig, CaptureError> {
    let ranges = match kind {
        // For loopback, query the output config (what the device is producing)
        DeviceKind::Loopback => device
            .supported_output_configs()
            .map(|configs| configs.collect::<Vec<_>>()),
        DeviceKind::Input => device
            .supported_input_configs()
            .map(|configs| configs.collect::<Vec<_>>()),
    };

    match ranges {
        Ok(ranges) => {
            let exact = ranges.into_iter().find(|range| {
                is_supported_format(range.sample_format())
                    && range.min_sample_rate().0 <= target_rate
                    && target_rate <= range.max_sample_rate().0
            });
            if let Some(range) = exact {
                return Ok(range.with_sample_rate(cpal::SampleRate(target_rate)));
            }
        }
        Err(e) => log::debug!("Could not list supported configs: {}", e),
    }

    match kind {
        DeviceKind::Loopback => device
            .default_output_config()
            .map_err(|e| CaptureError::ConfigError(format!("Loopback config: {}", e))),
        DeviceKind::Input => device
            .default_input_config()
            .map_err(|e| CaptureError::ConfigError(e.to_string())),
    }
}

fn open_stream(
    device: &CaptureDevice,
    target_rate: u32,
    buffer: Arc<Mutex<BlockBuffer>>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let cpal_device = find_device(&host, device)?;
    let config = choose_config(&cpal_device, device.kind, target_rate)?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let sample_format = config.sample_format();

    log::info!(
        "Audio capture: {} Hz, {} channels ({:?})",
        sample_rate,
        channels,
        device.kind
    );
    if sample_rate != target_rate {
        log::info!("Resampling {} Hz -> {} Hz", sample_rate, target_rate);
    }

    {
        let mut buf = buffer.lock();
        let capacity = buf.capacity;
        *buf = BlockBuffer::new(sample_rate, target_rate, capacity);
    }

    let stream_config: StreamConfig = config.into();
    let (dev, cfg) = (&cpal_device, &stream_config);
    match sample_format {
        SampleFormat::F32 => build_stream::<f32>(dev, cfg, buffer, channels, failed),
        SampleFormat::I16 => build_stream::<i16>(dev, cfg, buffer, channels, failed),
        SampleFormat::I32 => build_stream::<i32>(dev, cfg, buffer, channels, failed),
        SampleFormat::U16 => build_stream::<u16>(dev, cfg, buffer, channels, failed),
        other => {
            return Err(CaptureError::ConfigError(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::StreamError(e.to_string()))
}

/// Build audio stream for given sample type
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<BlockBuffer>>,
    channels: usize,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let f32_data: Vec<f32> = data
                .iter()
                .map(|s| cpal::Sample::from_sample(*s))
                .collect();
            let mono = downmix(&f32_data, channels);
            buffer.lock().push_mono(&mono);
        },
        move |err| {
            log::error!("Audio stream error: {}", err);
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                failed.store(true, Ordering::Relaxed);
            }
        },
        None,
    )
}
