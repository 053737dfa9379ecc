use std::path::PathBuf;

use clap::Parser;

use crate::config::{WatchBackend, WatcherConfig};
use crate::error::Result;
use crate::target::WatchTarget;

#[derive(Parser, Debug)]
#[command(name = "pollwatch")]
#[command(version)]
#[command(about = "Polls a directory on a fixed delay and logs every create, delete and modify")]
#[command(long_about = "pollwatch registers a watch on one directory, drains its pending events every few seconds and prints a block per change. The directory may not exist yet; the watch is (re)registered as soon as it appears.")]
pub struct Cli {
    /// Directory to watch, as a path or file:// URI
    #[arg(value_name = "TARGET", help = "Directory path or file:// URI to watch")]
    pub target: String,

    /// Delay between poll cycles in milliseconds
    #[arg(long, value_name = "MS", help = "Delay between poll cycles in ms")]
    pub delay: Option<u64>,

    /// Delay before the first poll cycle in milliseconds
    #[arg(long, value_name = "MS", help = "Delay before the first poll cycle in ms")]
    pub initial_delay: Option<u64>,

    /// Notification backend
    #[arg(short, long, help = "Notification backend")]
    pub backend: Option<WatchBackend>,

    /// Scan interval for the poll backend in milliseconds
    #[arg(long, value_name = "MS", help = "Scan interval of the poll backend in ms")]
    pub poll_interval: Option<u64>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", help = "Configuration file")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl Cli {
    pub fn watch_target(&self) -> Result<WatchTarget> {
        WatchTarget::parse(&self.target)
    }

    /// Defaults, then the config file, then the environment, then flags.
    pub fn watcher_config(&self) -> Result<WatcherConfig> {
        let mut config = match &self.config {
            Some(path) => WatcherConfig::load(path)?,
            None => WatcherConfig::default(),
        }
        .apply_env();

        if let Some(ms) = self.initial_delay {
            config.initial_delay_ms = ms;
        }
        if let Some(ms) = self.delay {
            config.poll_delay_ms = ms;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(ms) = self.poll_interval {
            config.poll_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        // stdout carries the event blocks only
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::try_parse_from(["pollwatch", "/tmp/watched"]).unwrap();

        assert_eq!(cli.watch_target().unwrap().path(), Path::new("/tmp/watched"));
        assert!(!cli.verbose);
        assert!(cli.backend.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "pollwatch",
            "--delay",
            "200",
            "--initial-delay",
            "100",
            "--backend",
            "poll",
            "--poll-interval",
            "50",
            "-v",
            "/tmp/watched",
        ])
        .unwrap();

        let config = cli.watcher_config().unwrap();
        assert_eq!(config.poll_delay_ms, 200);
        assert_eq!(config.initial_delay_ms, 100);
        assert_eq!(config.backend, WatchBackend::Poll);
        assert_eq!(config.poll_interval_ms, 50);
        assert!(cli.verbose);
    }

    #[test]
    fn test_zero_delay_rejected() {
        let cli = Cli::try_parse_from(["pollwatch", "--delay", "0", "/tmp/watched"]).unwrap();
        assert!(cli.watcher_config().is_err());
    }

    #[test]
    fn test_config_file_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("pollwatch.toml");
        std::fs::write(&file, "initial_delay_ms = 10\npoll_delay_ms = 20\n").unwrap();

        let cli = Cli::try_parse_from([
            "pollwatch",
            "--config",
            file.to_str().unwrap(),
            "--delay",
            "30",
            "/tmp/watched",
        ])
        .unwrap();

        let config = cli.watcher_config().unwrap();
        assert_eq!(config.initial_delay_ms, 10);
        assert_eq!(config.poll_delay_ms, 30);
    }

    #[test]
    fn test_missing_target_rejected() {
        assert!(Cli::try_parse_from(["pollwatch"]).is_err());
    }
}
