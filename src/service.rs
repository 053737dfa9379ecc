//! Watch service and watch keys.
//!
//! A [`WatchService`] owns the `notify` backend and the queue its events land
//! in. Registering a directory hands back a [`WatchKey`]; the key is drained
//! with [`WatchKey::poll_events`] and re-armed with [`WatchKey::reset`]. A key
//! stops being valid once its directory is removed or replaced, the backend
//! drops the watch, the key is cancelled, or the service is closed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use notify::{Config, Event, PollWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::config::WatchBackend;
use crate::error::{Result, WatchError};
use crate::events::{translate, ChangeEvent};
use crate::target::WatchTarget;

type BoxedWatcher = Box<dyn Watcher + Send>;

struct ServiceInner {
    watcher: Mutex<Option<BoxedWatcher>>,
    queue: Receiver<notify::Result<Event>>,
    closed: AtomicBool,
}

impl ServiceInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn unwatch(&self, dir: &Path) {
        let mut guard = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(watcher) = guard.as_mut() {
            // The backend may already have dropped the watch on its own.
            let _ = watcher.unwatch(dir);
        }
    }
}

pub struct WatchService {
    inner: Arc<ServiceInner>,
}

impl WatchService {
    /// Opens the notification backend. Nothing is watched until
    /// [`register`](Self::register) is called.
    pub fn new(backend: WatchBackend, poll_interval: Duration) -> Result<Self> {
        let (tx, rx) = unbounded::<notify::Result<Event>>();
        let handler = move |res: notify::Result<Event>| {
            // Receiver gone means the service was dropped.
            let _ = tx.send(res);
        };

        let watcher: BoxedWatcher = match backend {
            WatchBackend::Native => Box::new(notify::recommended_watcher(handler)?),
            WatchBackend::Poll => Box::new(PollWatcher::new(
                handler,
                Config::default().with_poll_interval(poll_interval),
            )?),
        };
        debug!("Opened {:?} watch service", backend);

        Ok(Self {
            inner: Arc::new(ServiceInner {
                watcher: Mutex::new(Some(watcher)),
                queue: rx,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Registers `target` for entry create, delete and modify events.
    pub fn register(&self, target: &WatchTarget) -> Result<WatchKey> {
        if self.inner.is_closed() {
            return Err(WatchError::Closed);
        }

        let dir = target.path();
        let identity = DirIdentity::of(dir)?;

        let mut guard = self.inner.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        let watcher = guard.as_mut().ok_or(WatchError::Closed)?;

        // Anything still queued belongs to an earlier registration.
        while self.inner.queue.try_recv().is_ok() {}

        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(WatchKey {
            target: target.clone(),
            identity,
            valid: AtomicBool::new(true),
            service: Arc::clone(&self.inner),
        })
    }

    /// Releases the backend. Keys registered with this service become invalid.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let watcher = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(watcher);
        debug!("Closed watch service");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registration of one directory with a [`WatchService`].
pub struct WatchKey {
    target: WatchTarget,
    identity: DirIdentity,
    valid: AtomicBool,
    service: Arc<ServiceInner>,
}

impl WatchKey {
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
            && !self.service.is_closed()
            && DirIdentity::of(self.target.path()).ok() == Some(self.identity)
    }

    /// Takes every event queued right now, without waiting for more.
    ///
    /// Events arriving while the drain runs are left for the next call.
    pub fn poll_events(&self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        if self.service.is_closed() {
            return events;
        }

        let pending = self.service.queue.len();
        for res in self.service.queue.try_iter().take(pending) {
            match res {
                Ok(event) => {
                    if translate(&event, &self.target, &mut events) {
                        self.valid.store(false, Ordering::SeqCst);
                    }
                }
                Err(err) => {
                    if matches!(
                        err.kind,
                        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound
                    ) {
                        self.valid.store(false, Ordering::SeqCst);
                    }
                }
            }
        }

        events
    }

    /// Re-arms the key after a drain. Returns `false` if the key can no
    /// longer deliver events and has to be registered again.
    pub fn reset(&self) -> bool {
        self.is_valid()
    }

    pub fn cancel(&self) {
        if self.valid.swap(false, Ordering::SeqCst) {
            self.service.unwatch(self.target.path());
        }
    }
}

/// Which directory a key was registered on. A directory that is deleted and
/// recreated under the same name gets a different identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl DirIdentity {
    fn of(dir: &Path) -> Result<Self> {
        let meta = fs::metadata(dir)?;
        if !meta.is_dir() {
            return Err(WatchError::NotADirectory(PathBuf::from(dir)));
        }
        Ok(Self::from_metadata(&meta))
    }

    #[cfg(unix)]
    fn from_metadata(meta: &fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    #[cfg(not(unix))]
    fn from_metadata(_meta: &fs::Metadata) -> Self {
        Self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn service() -> WatchService {
        WatchService::new(WatchBackend::Native, Duration::from_millis(100)).unwrap()
    }

    #[test]
    fn test_register_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let target = WatchTarget::new(temp_dir.path().join("missing"));

        let err = service().register(&target).err().unwrap();
        assert!(matches!(err, WatchError::Io(_)));
    }

    #[test]
    fn test_register_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let err = service().register(&WatchTarget::new(&file)).err().unwrap();
        assert!(matches!(err, WatchError::NotADirectory(_)));
    }

    #[test]
    fn test_key_valid_until_directory_removed() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("watched");
        fs::create_dir(&dir).unwrap();

        let service = service();
        let key = service.register(&WatchTarget::new(&dir)).unwrap();
        assert_eq!(key.target().path(), dir.as_path());
        assert!(key.is_valid());
        assert!(key.reset());

        fs::remove_dir(&dir).unwrap();
        assert!(!key.is_valid());
        assert!(!key.reset());
    }

    #[cfg(unix)]
    #[test]
    fn test_recreated_directory_invalidates_key() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("watched");
        fs::create_dir(&dir).unwrap();
        // Keep the old inode alive so the new directory cannot reuse it.
        let parked = temp_dir.path().join("parked");

        let service = service();
        let key = service.register(&WatchTarget::new(&dir)).unwrap();

        fs::rename(&dir, &parked).unwrap();
        fs::create_dir(&dir).unwrap();
        assert!(!key.is_valid());
    }

    #[test]
    fn test_cancel_and_close_invalidate() {
        let temp_dir = TempDir::new().unwrap();
        let target = WatchTarget::new(temp_dir.path());
        let service = service();

        let key = service.register(&target).unwrap();
        key.cancel();
        key.cancel();
        assert!(!key.is_valid());

        let key = service.register(&target).unwrap();
        service.close();
        service.close();
        assert!(service.is_closed());
        assert!(!key.is_valid());
        assert!(key.poll_events().is_empty());
        assert!(matches!(service.register(&target), Err(WatchError::Closed)));
    }

    #[test]
    fn test_poll_events_is_non_blocking() {
        let temp_dir = TempDir::new().unwrap();
        let service = service();
        let key = service.register(&WatchTarget::new(temp_dir.path())).unwrap();

        assert!(key.poll_events().is_empty());
    }

    #[test]
    fn test_poll_events_sees_new_entry() {
        let temp_dir = TempDir::new().unwrap();
        let service = service();
        let key = service.register(&WatchTarget::new(temp_dir.path())).unwrap();

        fs::File::create(temp_dir.path().join("a.txt")).unwrap();

        let mut seen = Vec::new();
        for _ in 0..50 {
            seen.extend(key.poll_events());
            if !seen.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }

        assert!(seen
            .iter()
            .any(|e| e.relative_path.as_deref() == Some(Path::new("a.txt"))));
    }
}
