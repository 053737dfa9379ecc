//! The directory a watcher observes.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{Result, WatchError};

/// The single directory a watcher observes.
///
/// Accepts a plain path or a `file://` URI. The directory does not have to
/// exist when the target is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    path: PathBuf,
}

impl WatchTarget {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Parse a command-line style target: `file://` URIs are converted to a
    /// local path, anything without a scheme is taken as a path.
    pub fn parse(input: &str) -> Result<Self> {
        if !looks_like_uri(input) {
            return Ok(Self::new(input));
        }

        let url =
            Url::parse(input).map_err(|e| WatchError::InvalidUri(format!("{input}: {e}")))?;
        if url.scheme() != "file" {
            return Err(WatchError::InvalidUri(format!(
                "{input}: unsupported scheme '{}'",
                url.scheme()
            )));
        }

        url.to_file_path()
            .map(Self::new)
            .map_err(|()| WatchError::InvalidUri(format!("{input}: not a local file path")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of `changed` relative to the target, if it is a direct child.
    pub fn relativize(&self, changed: &Path) -> Option<PathBuf> {
        let relative = changed.strip_prefix(&self.path).ok()?;
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(name), None) => Some(PathBuf::from(name.as_os_str())),
            _ => None,
        }
    }

    pub fn is_target(&self, changed: &Path) -> bool {
        changed == self.path
    }
}

// Windows drive letters ("C:\dir") parse as a one-letter scheme.
fn looks_like_uri(input: &str) -> bool {
    match input.split_once("://") {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
        }
        None => input.starts_with("file:"),
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<PathBuf> for WatchTarget {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for WatchTarget {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for WatchTarget {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}
