//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while creating, running or closing a watcher.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The target exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The target was given as a URI that does not name a local file.
    #[error("invalid watch target uri: {0}")]
    InvalidUri(String),

    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The watcher or its watch service has been closed.
    #[error("watch service is closed")]
    Closed,

    /// A fixed-delay task was already scheduled.
    #[error("scheduler already started")]
    AlreadyStarted,

    /// The scheduler thread panicked while running a poll cycle.
    #[error("scheduler thread panicked")]
    SchedulerPanicked,

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
