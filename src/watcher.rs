//! The directory watcher and its poll cycle.

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::error::{Result, WatchError};
use crate::scheduler::FixedDelayScheduler;
use crate::service::{WatchKey, WatchService};
use crate::target::WatchTarget;

type EventWriter = Box<dyn Write + Send>;

/// Polls one directory on a fixed delay and writes a block per change.
///
/// The directory does not have to exist: registration is retried on every
/// cycle until it succeeds, and again whenever the directory disappears.
pub struct DirectoryWatcher {
    target: WatchTarget,
    config: WatcherConfig,
    state: Arc<Mutex<PollState>>,
    scheduler: FixedDelayScheduler,
    closed: bool,
}

/// Everything a poll cycle touches. Guarded by one lock so scheduled cycles,
/// `poll_once` and `close` never interleave.
struct PollState {
    target: WatchTarget,
    service: WatchService,
    key: Option<WatchKey>,
    registered: bool,
    out: EventWriter,
}

impl DirectoryWatcher {
    /// Opens a watcher with the default configuration, writing to stdout.
    pub fn new(target: impl Into<WatchTarget>) -> Result<Self> {
        Self::with_config(target, WatcherConfig::default())
    }

    pub fn with_config(target: impl Into<WatchTarget>, config: WatcherConfig) -> Result<Self> {
        Self::with_writer(target, config, io::stdout())
    }

    /// Opens a watcher whose event blocks go to `writer`.
    pub fn with_writer<W>(
        target: impl Into<WatchTarget>,
        config: WatcherConfig,
        writer: W,
    ) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        config.validate()?;
        let target = target.into();
        let service = WatchService::new(config.backend, config.poll_interval())?;

        Ok(Self {
            state: Arc::new(Mutex::new(PollState {
                target: target.clone(),
                service,
                key: None,
                registered: false,
                out: Box::new(writer),
            })),
            scheduler: FixedDelayScheduler::new("pollwatch-scheduler"),
            target,
            config,
            closed: false,
        })
    }

    pub fn target(&self) -> &Path {
        self.target.path()
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Starts the background poll cycles. Starting a running watcher again
    /// does nothing.
    pub fn start_watch(&mut self) -> Result<()> {
        if self.closed {
            return Err(WatchError::Closed);
        }
        if self.scheduler.is_running() {
            debug!("Watcher for {} already started", self.target);
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        self.scheduler.schedule_with_fixed_delay(
            self.config.initial_delay(),
            self.config.poll_delay(),
            move || lock(&state).run_cycle(),
        )?;

        info!(
            "Watching {} every {:?} ({:?} backend)",
            self.target,
            self.config.poll_delay(),
            self.config.backend
        );
        Ok(())
    }

    /// Runs one poll cycle on the calling thread.
    pub fn poll_once(&self) {
        if !self.closed {
            lock(&self.state).run_cycle();
        }
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.state).registered
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stops the poll cycles, waiting for one in progress, then cancels the
    /// watch and releases the watch service. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let stopped = self.scheduler.shutdown();

        let mut state = lock(&self.state);
        state.service.close();
        state.unregister();
        drop(state);

        info!("Stopped watching {}", self.target);
        stopped
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl PollState {
    fn run_cycle(&mut self) {
        if !self.registered {
            match self.service.register(&self.target) {
                Ok(key) => {
                    debug!("Registered watch on {}", self.target);
                    self.key = Some(key);
                    self.registered = true;
                }
                // Retried on the next cycle.
                Err(_) => return,
            }
        }

        let Some(key) = self.key.as_ref() else {
            self.registered = false;
            return;
        };

        if !key.is_valid() {
            self.unregister();
            return;
        }

        for event in key.poll_events() {
            if event.kind.is_overflow() {
                continue;
            }
            if let Err(err) = event.write_block(&mut self.out) {
                warn!("Failed to write event for {}: {}", self.target, err);
            }
        }

        if !key.reset() {
            self.unregister();
        }
    }

    fn unregister(&mut self) {
        self.registered = false;
        if let Some(key) = self.key.take() {
            key.cancel();
        }
    }
}

fn lock(state: &Mutex<PollState>) -> MutexGuard<'_, PollState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn watcher(target: &Path) -> (DirectoryWatcher, SharedBuf) {
        let buf = SharedBuf::default();
        let config = WatcherConfig::default().with_delay(Duration::from_millis(50));
        let watcher = DirectoryWatcher::with_writer(target, config, buf.clone()).unwrap();
        (watcher, buf)
    }

    #[test]
    fn test_construction_does_not_register() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, _buf) = watcher(temp_dir.path());

        assert!(!watcher.is_registered());
        assert!(!watcher.is_running());
        assert_eq!(watcher.target(), temp_dir.path());
        assert_eq!(watcher.config().poll_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = WatcherConfig::default();
        config.poll_delay_ms = 0;

        let result = DirectoryWatcher::with_writer(temp_dir.path(), config, io::sink());
        assert!(matches!(result, Err(WatchError::Config(_))));
    }

    #[test]
    fn test_missing_directory_is_retried_silently() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("later");
        let (watcher, buf) = watcher(&dir);

        watcher.poll_once();
        assert!(!watcher.is_registered());
        assert!(buf.contents().is_empty());

        fs::create_dir(&dir).unwrap();
        watcher.poll_once();
        assert!(watcher.is_registered());
    }

    #[test]
    fn test_removed_directory_unregisters() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("watched");
        fs::create_dir(&dir).unwrap();
        let (watcher, _buf) = watcher(&dir);

        watcher.poll_once();
        assert!(watcher.is_registered());

        fs::remove_dir(&dir).unwrap();
        watcher.poll_once();
        assert!(!watcher.is_registered());

        fs::create_dir(&dir).unwrap();
        watcher.poll_once();
        assert!(watcher.is_registered());
    }

    #[test]
    fn test_start_and_close_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, _buf) = watcher(temp_dir.path());

        watcher.start_watch().unwrap();
        watcher.start_watch().unwrap();
        assert!(watcher.is_running());

        watcher.close().unwrap();
        watcher.close().unwrap();
        assert!(!watcher.is_running());
        assert!(!watcher.is_registered());
    }

    #[test]
    fn test_start_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, _buf) = watcher(temp_dir.path());

        watcher.close().unwrap();
        assert!(matches!(watcher.start_watch(), Err(WatchError::Closed)));

        watcher.poll_once();
        assert!(!watcher.is_registered());
    }
}
