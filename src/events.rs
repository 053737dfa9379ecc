//! Change events, their log blocks, and translation from `notify` events.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::target::WatchTarget;

/// Delimiter line printed above and below every event block.
pub const BLOCK_DELIMITER: &str = "**************************************";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Create,
    Delete,
    Modify,
    /// Some events were lost; there is no path attached.
    Overflow,
}

impl WatchEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            WatchEventKind::Create => "ENTRY_CREATE",
            WatchEventKind::Delete => "ENTRY_DELETE",
            WatchEventKind::Modify => "ENTRY_MODIFY",
            WatchEventKind::Overflow => "OVERFLOW",
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, WatchEventKind::Overflow)
    }
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One change observed in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: WatchEventKind,
    pub relative_path: Option<PathBuf>,
}

impl ChangeEvent {
    pub fn new(kind: WatchEventKind, relative_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            relative_path: Some(relative_path.into()),
        }
    }

    pub fn overflow() -> Self {
        Self {
            kind: WatchEventKind::Overflow,
            relative_path: None,
        }
    }

    /// Writes the four-line log block for this event.
    pub fn write_block<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let changed = self
            .relative_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        writeln!(out, "{BLOCK_DELIMITER}")?;
        writeln!(out, "Eventname: {}", self.kind)?;
        writeln!(out, "File changed: {changed}")?;
        writeln!(out, "{BLOCK_DELIMITER}")?;
        out.flush()
    }
}

/// Translates one `notify` event into change events for `target`, appending
/// them to `out` in the order their paths were reported.
///
/// Returns `true` when the event says the target directory itself went away,
/// which makes the registration unusable.
pub(crate) fn translate(event: &Event, target: &WatchTarget, out: &mut Vec<ChangeEvent>) -> bool {
    if event.need_rescan() {
        out.push(ChangeEvent::overflow());
        return false;
    }

    if event.paths.iter().any(|p| target.is_target(p)) {
        return matches!(
            event.kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        );
    }

    let mut push = |kind: WatchEventKind, path: &Path| {
        if let Some(relative) = target.relativize(path) {
            out.push(ChangeEvent::new(kind, relative));
        }
    };

    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                push(WatchEventKind::Create, path);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                push(WatchEventKind::Delete, path);
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => {
                for path in &event.paths {
                    push(WatchEventKind::Delete, path);
                }
            }
            RenameMode::To => {
                for path in &event.paths {
                    push(WatchEventKind::Create, path);
                }
            }
            // A tracked pair repeats the From and To halves already delivered.
            RenameMode::Both if event.attrs.tracker().is_some() => {}
            RenameMode::Both => {
                if let [from, to] = event.paths.as_slice() {
                    push(WatchEventKind::Delete, from);
                    push(WatchEventKind::Create, to);
                }
            }
            RenameMode::Any | RenameMode::Other => {
                for path in &event.paths {
                    let kind = if path.symlink_metadata().is_ok() {
                        WatchEventKind::Create
                    } else {
                        WatchEventKind::Delete
                    };
                    push(kind, path);
                }
            }
        },
        EventKind::Modify(_) => {
            for path in &event.paths {
                push(WatchEventKind::Modify, path);
            }
        }
        // Access and unclassified events are not among the registered kinds.
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }

    false
}
