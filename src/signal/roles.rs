//! The two roles of a signal channel.
//!
//! The child process owns readiness and stop reporting; the parent only
//! reads them, asks for a stop, and resets the channel before a fresh start.
//! Keeping the roles in separate types makes it impossible for the parent to
//! fake readiness.

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Result;

use super::channel::{FileSignalChannel, Marker, SignalChannel};

/// Interval between two polls while waiting on a marker.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Child-side view of a channel.
#[derive(Debug, Clone)]
pub struct SignalOwner<C: SignalChannel = FileSignalChannel> {
    channel: C,
}

/// Parent-side view of a channel.
#[derive(Debug, Clone)]
pub struct SignalReader<C: SignalChannel = FileSignalChannel> {
    channel: C,
}

impl SignalOwner<FileSignalChannel> {
    /// Opens the owner role for an installation directory.
    #[must_use]
    pub fn for_installation(directory: &Path) -> Self {
        Self::new(FileSignalChannel::new(directory))
    }
}

impl<C: SignalChannel> SignalOwner<C> {
    /// Wraps a channel in the owner role.
    #[must_use]
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Reports that startup has completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn mark_started(&self) -> Result<()> {
        info!("Appliance reports started");
        self.channel.mark(Marker::Started)
    }

    /// Reports a graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn mark_stopped(&self) -> Result<()> {
        info!("Appliance reports stopped");
        self.channel.mark(Marker::Stopped)
    }

    /// Returns true if the parent asked for a shutdown.
    #[must_use]
    pub fn must_stop(&self) -> bool {
        self.channel.is_marked(Marker::MustStop)
    }

    /// Polls until the parent asks for a shutdown.
    pub async fn wait_for_stop_request(&self, poll: Duration) {
        while !self.must_stop() {
            tokio::time::sleep(poll).await;
        }
        debug!("Stop requested by parent");
    }
}

impl SignalReader<FileSignalChannel> {
    /// Opens the reader role for an installation directory.
    #[must_use]
    pub fn for_installation(directory: &Path) -> Self {
        Self::new(FileSignalChannel::new(directory))
    }
}

impl<C: SignalChannel> SignalReader<C> {
    /// Wraps a channel in the reader role.
    #[must_use]
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Returns the underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns true once the child reported readiness.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.channel.is_marked(Marker::Started)
    }

    /// Returns true once the child reported a shutdown.
    #[must_use]
    pub fn has_stopped(&self) -> bool {
        self.channel.is_marked(Marker::Stopped)
    }

    /// Asks the child to shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn request_stop(&self) -> Result<()> {
        self.channel.mark(Marker::MustStop)
    }

    /// Clears every marker so stale state from a previous run cannot be read.
    ///
    /// # Errors
    ///
    /// Returns an error if a marker cannot be removed.
    pub fn reset(&self) -> Result<()> {
        for marker in Marker::ALL {
            self.channel.clear(marker)?;
        }
        Ok(())
    }

    /// Polls until the child reports started (true), reports stopped, or the
    /// timeout elapses (false).
    pub async fn wait_for_start(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if self.has_started() {
                return true;
            }
            if self.has_stopped() {
                debug!("Appliance stopped before reporting started");
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MemorySignalChannel;
    use std::sync::Arc;

    fn pair() -> (SignalOwner<Arc<MemorySignalChannel>>, SignalReader<Arc<MemorySignalChannel>>) {
        let channel = Arc::new(MemorySignalChannel::new());
        (SignalOwner::new(Arc::clone(&channel)), SignalReader::new(channel))
    }

    #[test]
    fn test_reset_clears_everything() {
        let (owner, reader) = pair();
        owner.mark_started().unwrap();
        owner.mark_stopped().unwrap();
        reader.request_stop().unwrap();

        reader.reset().unwrap();

        assert!(!reader.has_started());
        assert!(!reader.has_stopped());
        assert!(!owner.must_stop());
    }

    #[test]
    fn test_crash_leaves_started_without_stopped() {
        let (owner, reader) = pair();
        owner.mark_started().unwrap();

        assert!(reader.has_started());
        assert!(!reader.has_stopped());
    }

    #[tokio::test]
    async fn test_wait_for_start_returns_when_started() {
        let (owner, reader) = pair();

        let child = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            owner.mark_started().unwrap();
        });

        let started = std::time::Instant::now();
        assert!(reader.wait_for_start(Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        child.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_start_gives_up_when_stopped_first() {
        let (owner, reader) = pair();
        owner.mark_stopped().unwrap();

        let started = std::time::Instant::now();
        assert!(!reader.wait_for_start(Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_for_start_times_out() {
        let (_owner, reader) = pair();

        let started = std::time::Instant::now();
        assert!(!reader.wait_for_start(Duration::from_millis(300)).await);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_owner_sees_stop_request() {
        let (owner, reader) = pair();
        reader.request_stop().unwrap();

        tokio::time::timeout(Duration::from_secs(1), owner.wait_for_stop_request(POLL_INTERVAL))
            .await
            .unwrap();
    }

    #[test]
    fn test_file_roles_share_directory() {
        let dir = tempfile::tempdir().unwrap();
        let owner = SignalOwner::for_installation(dir.path());
        let reader = SignalReader::for_installation(dir.path());

        owner.mark_started().unwrap();
        assert!(reader.has_started());
        reader.reset().unwrap();
        assert!(!reader.has_started());
    }
}
