//! Real-time BPM detection from system audio
//!
//! Captures fixed-length blocks from a loopback or input device, estimates
//! the tempo of each block, and publishes the smoothed value to a companion
//! app through a file, a UDP datagram, or a local pipe.

pub mod audio;
pub mod cli;
pub mod config;
pub mod output;
pub mod pause;
pub mod probe;
pub mod state;
pub mod tempo;

use audio::{BlockSource, CaptureError, CaptureHandle, SourceError};
use cli::Cli;
use config::{load_config, BridgePaths, Config, ConfigError};
use output::{OutputSink, SinkKind};
use pause::{FilePauseSignal, PauseController, PauseSignal};
use state::{CycleOutcome, Session};

use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// How often the loop wakes to re-check the pause signal while waiting
const PAUSE_TICK: Duration = Duration::from_millis(500);

/// Startup errors
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Counters reported when the detection loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Blocks run through the pipeline
    pub cycles: u64,

    /// Blocks discarded while paused
    pub paused_blocks: u64,

    /// Values handed to the sink successfully
    pub published: u64,

    /// Values the sink failed to deliver
    pub publish_failures: u64,
}

/// Entry point for the binary
pub async fn run(cli: Cli) -> Result<(), BridgeError> {
    let paths = cli.resolve_paths();

    if cli.list_devices {
        return print_devices();
    }
    if cli.probe_devices {
        return probe_and_save(&paths).await;
    }

    let config = load_config(&paths.settings)?;
    log::info!(
        "Settings: {} Hz, {}s blocks, {}ms windows, {}-{} BPM, band {}-{} Hz",
        config.sample_rate,
        config.capture_duration_secs,
        config.precision_ms,
        config.min_bpm,
        config.max_bpm,
        config.low_cut_hz,
        config.high_cut_hz
    );

    let devices = audio::list_devices()?;
    let preferred = audio::load_preference(&paths.device_config);
    let device =
        audio::select_device(&devices, preferred.as_deref()).ok_or(SourceError::NoDevices)?;
    log::info!("Capturing from: {} ({:?})", device.name, device.kind);

    let mut capture = CaptureHandle::start(device, config.sample_rate, config.block_len())?;
    let mut sink = build_sink(&cli, &paths);
    log::info!("Publishing to {}", sink.describe());

    let mut session = Session::new(&config);
    let mut pause = PauseController::new(FilePauseSignal::new(&paths.pause_flag));

    // Create shutdown channel for the detection loop
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupt received");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                // Keep the sender alive so the loop is not shut down
                std::future::pending::<()>().await;
            }
        }
    });

    let result = run_loop(&mut session, &mut capture, &mut pause, &mut sink, shutdown_rx).await;
    capture.stop();

    let stats = result?;
    log::info!(
        "Stopped after {} cycles ({} published, {} failed, {} paused blocks)",
        stats.cycles,
        stats.published,
        stats.publish_failures,
        stats.paused_blocks
    );
    Ok(())
}

fn build_sink(cli: &Cli, paths: &BridgePaths) -> OutputSink {
    match cli.sink {
        SinkKind::File => OutputSink::file(&paths.output),
        SinkKind::Udp => OutputSink::udp(cli.udp_addr),
        SinkKind::Pipe => OutputSink::pipe(cli.pipe_path()),
    }
}

fn print_devices() -> Result<(), BridgeError> {
    let devices = audio::list_devices()?;
    if devices.is_empty() {
        return Err(SourceError::NoDevices.into());
    }
    for (i, device) in devices.iter().enumerate() {
        println!("{}. {} ({:?})", i, device.name, device.kind);
    }
    Ok(())
}

async fn probe_and_save(paths: &BridgePaths) -> Result<(), BridgeError> {
    let sample_rate = match load_config(&paths.settings) {
        Ok(config) => config.sample_rate,
        Err(e) => {
            log::warn!("{}; probing at the default rate", e);
            Config::default().sample_rate
        }
    };

    let devices = audio::list_devices()?;
    let levels = probe::probe_devices(&devices, sample_rate).await;
    let Some(loudest) = levels.first() else {
        return Err(SourceError::NoDevices.into());
    };

    for (i, level) in levels.iter().enumerate() {
        let note = if level.is_quiet() { " (quiet)" } else { "" };
        println!("{}. {} - {:.5}{}", i, level.device.name, level.rms, note);
    }
    if loudest.is_quiet() {
        log::warn!("Every device is quiet; is anything playing?");
    }

    audio::save_preference(&paths.device_config, &loudest.device.name)?;
    log::info!(
        "Saved '{}' as preferred device in {}",
        loudest.device.name,
        paths.device_config.display()
    );
    Ok(())
}

/// Detection loop: one pipeline pass per captured block until shutdown or
/// until the source runs dry.
///
/// `next_block` may be cancelled when the pause tick or shutdown wins the
/// race, so sources must not lose audio when their future is dropped.
pub async fn run_loop<S, P>(
    session: &mut Session,
    source: &mut S,
    pause: &mut PauseController<P>,
    sink: &mut OutputSink,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<LoopStats, CaptureError>
where
    S: BlockSource,
    P: PauseSignal,
{
    let mut stats = LoopStats::default();
    let mut pause_tick = tokio::time::interval(PAUSE_TICK);
    let clock = Instant::now();

    log::info!("Detection loop started");

    loop {
        let block = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                log::info!("Detection loop received shutdown signal");
                break;
            }
            _ = pause_tick.tick() => {
                pause.poll(Instant::now());
                continue;
            }
            block = source.next_block() => block?,
        };

        let Some(block) = block else {
            log::info!("Audio source exhausted");
            break;
        };

        if pause.is_paused() {
            stats.paused_blocks += 1;
            continue;
        }

        stats.cycles += 1;
        let now = clock.elapsed().as_secs_f64();

        match session.process_block(&block, now) {
            CycleOutcome::FilterUnavailable => {
                log::debug!("No filter, skipping block");
            }
            CycleOutcome::NoBeats => {
                log::debug!("No beats detected");
            }
            CycleOutcome::NoTempo { peaks } => {
                log::info!("Beats detected: {}, but no tempo yet", peaks);
            }
            CycleOutcome::Tempo {
                peaks,
                raw_bpm,
                bpm,
                publish,
            } => {
                log::info!("Beats detected: {} - BPM: {} (raw {})", peaks, bpm, raw_bpm);
                if !publish {
                    log::info!("BPM unstable, not published");
                    continue;
                }
                match sink.publish(bpm).await {
                    Ok(()) => stats.published += 1,
                    Err(e) => {
                        stats.publish_failures += 1;
                        log::warn!("Failed to publish BPM: {}", e);
                    }
                }
            }
        }
    }

    Ok(stats)
}
