pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod service;
pub mod target;
pub mod watcher;

pub use config::{WatchBackend, WatcherConfig};
pub use error::{Result, WatchError};
pub use events::{ChangeEvent, WatchEventKind, BLOCK_DELIMITER};
pub use scheduler::FixedDelayScheduler;
pub use service::{WatchKey, WatchService};
pub use target::WatchTarget;
pub use watcher::DirectoryWatcher;
