//! Fixed-delay scheduling on a dedicated thread.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::debug;

use crate::error::{Result, WatchError};

/// Runs one task repeatedly on a dedicated thread with fixed-delay
/// semantics: each delay is measured from the end of the previous run, so
/// runs never overlap.
pub struct FixedDelayScheduler {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FixedDelayScheduler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn schedule_with_fixed_delay<F>(
        &mut self,
        initial_delay: Duration,
        delay: Duration,
        mut task: F,
    ) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        // Nothing is ever sent; dropping the sender is the stop signal.
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let wait = move |d: Duration| {
            matches!(stop_rx.recv_timeout(d), Err(RecvTimeoutError::Timeout))
        };

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                if !wait(initial_delay) {
                    return;
                }
                loop {
                    task();
                    if !wait(delay) {
                        break;
                    }
                }
            })?;

        debug!("Scheduled '{}' every {:?}", self.name, delay);
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops scheduling further runs and waits for a run in progress to
    /// finish. Calling it again does nothing.
    pub fn shutdown(&mut self) -> Result<()> {
        drop(self.stop_tx.take());
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WatchError::SchedulerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for FixedDelayScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
