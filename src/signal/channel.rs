//! Marker-based signal channels.
//!
//! A channel is three independent markers that can be set, cleared and
//! tested. Every primitive is idempotent and returns immediately; there is
//! no wake-up mechanism, callers poll.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, SignalError};

/// File name of the "started" marker.
pub const STARTED_MARKER: &str = "appliance.started";
/// File name of the "stopped" marker.
pub const STOPPED_MARKER: &str = "appliance.stopped";
/// File name of the "must stop" marker.
pub const MUST_STOP_MARKER: &str = "appliance.muststop";

/// The markers a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The child finished its own startup.
    Started,
    /// The child shut down gracefully.
    Stopped,
    /// The parent asks the child to shut down.
    MustStop,
}

impl Marker {
    /// All markers.
    pub const ALL: [Self; 3] = [Self::Started, Self::Stopped, Self::MustStop];

    /// File name used by [`FileSignalChannel`].
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Started => STARTED_MARKER,
            Self::Stopped => STOPPED_MARKER,
            Self::MustStop => MUST_STOP_MARKER,
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::MustStop => write!(f, "must-stop"),
        }
    }
}

/// Poll-based readiness/stop channel shared by a parent and a child.
pub trait SignalChannel: Send + Sync {
    /// Returns true if the marker is set.
    fn is_marked(&self, marker: Marker) -> bool;

    /// Sets the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    fn mark(&self, marker: Marker) -> Result<()>;

    /// Clears the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be removed.
    fn clear(&self, marker: Marker) -> Result<()>;
}

/// Channel backed by marker files in an appliance's installation directory.
#[derive(Debug, Clone)]
pub struct FileSignalChannel {
    directory: PathBuf,
}

impl FileSignalChannel {
    /// Creates a channel rooted at the given directory.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Returns the directory holding the markers.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the path of a marker file.
    #[must_use]
    pub fn marker_path(&self, marker: Marker) -> PathBuf {
        self.directory.join(marker.file_name())
    }
}

impl SignalChannel for FileSignalChannel {
    fn is_marked(&self, marker: Marker) -> bool {
        self.marker_path(marker).is_file()
    }

    fn mark(&self, marker: Marker) -> Result<()> {
        let path = self.marker_path(marker);
        std::fs::create_dir_all(&self.directory)
            .and_then(|()| std::fs::write(&path, Utc::now().to_rfc3339()))
            .map_err(|e| SignalError::marker(&path, e.to_string()).into())
    }

    fn clear(&self, marker: Marker) -> Result<()> {
        let path = self.marker_path(marker);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SignalError::marker(&path, e.to_string()).into()),
        }
    }
}

/// Channel held entirely in memory, for parents and children in one process.
#[derive(Debug, Default)]
pub struct MemorySignalChannel {
    markers: Mutex<HashSet<Marker>>,
}

impl MemorySignalChannel {
    /// Creates a channel with no markers set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalChannel for MemorySignalChannel {
    fn is_marked(&self, marker: Marker) -> bool {
        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&marker)
    }

    fn mark(&self, marker: Marker) -> Result<()> {
        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(marker);
        Ok(())
    }

    fn clear(&self, marker: Marker) -> Result<()> {
        self.markers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&marker);
        Ok(())
    }
}

impl<C: SignalChannel + ?Sized> SignalChannel for std::sync::Arc<C> {
    fn is_marked(&self, marker: Marker) -> bool {
        (**self).is_marked(marker)
    }

    fn mark(&self, marker: Marker) -> Result<()> {
        (**self).mark(marker)
    }

    fn clear(&self, marker: Marker) -> Result<()> {
        (**self).clear(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_markers_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileSignalChannel::new(dir.path().join("unit"));

        assert!(!channel.is_marked(Marker::Started));

        channel.mark(Marker::Started).unwrap();
        channel.mark(Marker::Started).unwrap();
        assert!(channel.is_marked(Marker::Started));
        assert!(channel.marker_path(Marker::Started).ends_with(STARTED_MARKER));

        channel.clear(Marker::Started).unwrap();
        channel.clear(Marker::Started).unwrap();
        assert!(!channel.is_marked(Marker::Started));
    }

    #[test]
    fn test_file_marker_holds_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileSignalChannel::new(dir.path());

        channel.mark(Marker::Stopped).unwrap();
        let content = std::fs::read_to_string(channel.marker_path(Marker::Stopped)).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&content).is_ok());
    }

    #[test]
    fn test_markers_are_independent() {
        let channel = MemorySignalChannel::new();
        channel.mark(Marker::MustStop).unwrap();

        assert!(channel.is_marked(Marker::MustStop));
        assert!(!channel.is_marked(Marker::Started));
        assert!(!channel.is_marked(Marker::Stopped));
    }
}
