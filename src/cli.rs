use crate::config::{default_base_dir, BridgePaths};
use crate::output::{default_pipe_path, SinkKind, DEFAULT_UDP_TARGET};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bpm-bridge",
    version,
    about = "Real-time BPM detection from system audio"
)]
pub struct Cli {
    /// Directory holding the settings, device, pause and output files
    /// (defaults to the executable's directory)
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Settings file (overrides <base-dir>/bpm_settings.json)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Where accepted BPM values are published
    #[arg(long, value_enum, default_value_t = SinkKind::File)]
    pub sink: SinkKind,

    /// Destination for the udp sink
    #[arg(long, default_value = DEFAULT_UDP_TARGET)]
    pub udp_addr: SocketAddr,

    /// Named pipe (Windows) or Unix socket path for the pipe sink
    #[arg(long)]
    pub pipe_path: Option<PathBuf>,

    /// Output file for the file sink (overrides <base-dir>/bpm_config.json)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Pause flag file (overrides <base-dir>/pause_flag.json)
    #[arg(long)]
    pub pause_file: Option<PathBuf>,

    /// Device preference file (overrides <base-dir>/bpm_device_config.json)
    #[arg(long)]
    pub device_config: Option<PathBuf>,

    /// List capture devices in selection order and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Measure the level of every device, save the loudest as preferred, and exit
    #[arg(long, conflicts_with = "list_devices")]
    pub probe_devices: bool,
}

impl Cli {
    /// Resolve every shared file against the base directory and overrides
    pub fn resolve_paths(&self) -> BridgePaths {
        let base = self.base_dir.clone().unwrap_or_else(default_base_dir);
        let defaults = BridgePaths::in_dir(&base);

        BridgePaths {
            settings: self.settings.clone().unwrap_or(defaults.settings),
            device_config: self.device_config.clone().unwrap_or(defaults.device_config),
            pause_flag: self.pause_file.clone().unwrap_or(defaults.pause_flag),
            output: self.output.clone().unwrap_or(defaults.output),
        }
    }

    pub fn pipe_path(&self) -> PathBuf {
        self.pipe_path.clone().unwrap_or_else(default_pipe_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn defaults_resolve_under_base_dir() {
        let cli = Cli::parse_from(["bpm-bridge", "--base-dir", "/srv/bridge"]);
        let paths = cli.resolve_paths();

        assert_eq!(cli.sink, SinkKind::File);
        assert_eq!(cli.udp_addr.port(), 9955);
        assert_eq!(paths.settings, Path::new("/srv/bridge/bpm_settings.json"));
        assert_eq!(paths.device_config, Path::new("/srv/bridge/bpm_device_config.json"));
        assert_eq!(paths.pause_flag, Path::new("/srv/bridge/pause_flag.json"));
        assert_eq!(paths.output, Path::new("/srv/bridge/bpm_config.json"));
    }

    #[test]
    fn individual_paths_override_base_dir() {
        let cli = Cli::parse_from([
            "bpm-bridge",
            "--base-dir",
            "/srv/bridge",
            "--output",
            "/tmp/out.json",
            "--sink",
            "udp",
            "--udp-addr",
            "127.0.0.1:7000",
        ]);
        let paths = cli.resolve_paths();

        assert_eq!(paths.output, Path::new("/tmp/out.json"));
        assert_eq!(paths.settings, Path::new("/srv/bridge/bpm_settings.json"));
        assert_eq!(cli.sink, SinkKind::Udp);
        assert_eq!(cli.udp_addr.port(), 7000);
    }

    #[test]
    fn maintenance_modes_are_exclusive() {
        let result = Cli::try_parse_from(["bpm-bridge", "--list-devices", "--probe-devices"]);
        assert!(result.is_err());
    }
}
