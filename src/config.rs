//! Configuration management for pollwatch
//!
//! This module provides the watcher configuration, its defaults, and the
//! layers the command line stacks on top of them (TOML file, environment).

use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Which `notify` backend feeds the watch service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Native file system events (inotify, FSEvents, ReadDirectoryChangesW)
    Native,
    /// Periodic directory scans, for file systems without native events
    Poll,
}

/// Configuration for a directory watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay before the first poll cycle in milliseconds
    pub initial_delay_ms: u64,
    /// Delay between the end of one poll cycle and the start of the next
    pub poll_delay_ms: u64,
    /// Notification backend
    pub backend: WatchBackend,
    /// Scan interval of the poll backend in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            poll_delay_ms: 5_000,
            backend: WatchBackend::Native,
            poll_interval_ms: 1_000,
        }
    }
}

impl WatcherConfig {
    /// Get initial delay duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Get poll delay duration
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Get poll backend scan interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Same delay before the first cycle and between cycles
    pub fn with_delay(mut self, delay: Duration) -> Self {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.initial_delay_ms = ms;
        self.poll_delay_ms = ms;
        self
    }

    pub fn with_backend(mut self, backend: WatchBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Parse configuration from TOML; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Override with environment variables if present
    pub fn apply_env(mut self) -> Self {
        if let Some(ms) = env_u64("POLLWATCH_INITIAL_DELAY_MS") {
            self.initial_delay_ms = ms;
        }

        if let Some(ms) = env_u64("POLLWATCH_POLL_DELAY_MS") {
            self.poll_delay_ms = ms;
        }

        if let Some(ms) = env_u64("POLLWATCH_POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms;
        }

        if let Ok(val) = std::env::var("POLLWATCH_BACKEND") {
            if let Ok(backend) = WatchBackend::from_str(&val, true) {
                self.backend = backend;
            }
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(WatchError::Config(
                "initial_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.poll_delay_ms == 0 {
            return Err(WatchError::Config(
                "poll_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.backend == WatchBackend::Poll && self.poll_interval_ms == 0 {
            return Err(WatchError::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
