//! Plan sources.
//!
//! A source supplies the raw plan bytes and tells the observer when the plan
//! has changed. Change checks are throttled: inside the check interval a
//! source always answers "no change" without looking.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{PlanError, Result};

/// Default interval between two change checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Supplies plan bytes and debounced change detection.
pub trait PlanSource: Send + Sync {
    /// Returns true if the source holds no content.
    fn is_empty(&self) -> bool;

    /// Returns a fresh snapshot of the current plan bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read.
    fn get_source(&self) -> Result<Vec<u8>>;

    /// Looks for a change since the previous call. Only invoked outside the
    /// check interval.
    fn check_for_update(&self) -> bool;

    /// Throttle state backing [`PlanSource::has_updated_plan`].
    fn throttle(&self) -> &UpdateThrottle;

    /// Returns true if the plan changed. Calls within the check interval of
    /// the previous check return false.
    fn has_updated_plan(&self) -> bool {
        let throttle = self.throttle();
        if throttle.take_forced() {
            throttle.touch();
            return true;
        }
        if !throttle.try_begin_check() {
            return false;
        }
        self.check_for_update()
    }

    /// Makes the next [`PlanSource::has_updated_plan`] report a change.
    fn reload(&self) {
        self.throttle().force();
    }
}

/// Debounce state shared by every source.
#[derive(Debug)]
pub struct UpdateThrottle {
    interval: Duration,
    last_check: Mutex<Option<Instant>>,
    forced: AtomicBool,
}

impl UpdateThrottle {
    /// Creates a throttle with the given check interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_check: Mutex::new(None),
            forced: AtomicBool::new(false),
        }
    }

    /// Returns the check interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts a check if the interval has elapsed since the last one.
    fn try_begin_check(&self) -> bool {
        let mut last = self.last_check.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(previous) = *last
            && now.duration_since(previous) < self.interval
        {
            return false;
        }
        *last = Some(now);
        true
    }

    fn touch(&self) {
        *self.last_check.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn force(&self) {
        self.forced.store(true, Ordering::SeqCst);
    }

    fn take_forced(&self) -> bool {
        self.forced.swap(false, Ordering::SeqCst)
    }
}

impl Default for UpdateThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL)
    }
}

/// Plan source backed by a file on disk.
///
/// A filesystem watcher raises an internal flag on writes; the flag only
/// feeds change detection, reads always go to disk.
pub struct FilePlanSource {
    path: PathBuf,
    updated: Arc<AtomicBool>,
    throttle: UpdateThrottle,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for FilePlanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePlanSource")
            .field("path", &self.path)
            .field("updated", &self.updated.load(Ordering::SeqCst))
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl FilePlanSource {
    /// Opens a plan file and starts watching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be installed.
    pub fn new(path: impl Into<PathBuf>, check_interval: Duration) -> Result<Self> {
        let path = path.into();
        let updated = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&updated);
        let file_name = path.file_name().map(std::ffi::OsStr::to_os_string);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res
                && (event.kind.is_modify() || event.kind.is_create())
                && event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(std::ffi::OsStr::to_os_string) == file_name)
            {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .map_err(|e| PlanError::Watch {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Editors often replace the file, so watch the directory holding it.
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| PlanError::Watch {
                path: path.clone(),
                message: e.to_string(),
            })?;

        info!("Watching plan file: {}", path.display());

        Ok(Self {
            path,
            updated,
            throttle: UpdateThrottle::new(check_interval),
            _watcher: watcher,
        })
    }

    /// Returns the watched path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlanSource for FilePlanSource {
    fn is_empty(&self) -> bool {
        std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0)
    }

    fn get_source(&self) -> Result<Vec<u8>> {
        debug!("Reading plan from: {}", self.path.display());
        std::fs::read(&self.path).map_err(|e| {
            PlanError::SourceUnavailable {
                message: format!("{}: {e}", self.path.display()),
            }
            .into()
        })
    }

    fn check_for_update(&self) -> bool {
        let changed = self.updated.swap(false, Ordering::SeqCst);
        if changed {
            info!("Plan file changed: {}", self.path.display());
        }
        changed
    }

    fn throttle(&self) -> &UpdateThrottle {
        &self.throttle
    }
}

/// Plan source backed by an in-memory buffer.
///
/// Producers call [`MemoryPlanSource::copy_from`] while consumers read
/// snapshots; both sides may run on different threads.
#[derive(Debug, Default)]
pub struct MemoryPlanSource {
    buffer: RwLock<Vec<u8>>,
    updated: AtomicBool,
    throttle: UpdateThrottle,
}

impl MemoryPlanSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new(check_interval: Duration) -> Self {
        Self {
            buffer: RwLock::new(Vec::new()),
            updated: AtomicBool::new(false),
            throttle: UpdateThrottle::new(check_interval),
        }
    }

    /// Creates a source holding the given content.
    #[must_use]
    pub fn with_content(content: impl Into<Vec<u8>>, check_interval: Duration) -> Self {
        Self {
            buffer: RwLock::new(content.into()),
            updated: AtomicBool::new(false),
            throttle: UpdateThrottle::new(check_interval),
        }
    }

    /// Replaces the content and marks the plan as updated.
    pub fn copy_from(&self, content: &[u8]) {
        let mut buffer = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        buffer.clear();
        buffer.extend_from_slice(content);
        self.updated.store(true, Ordering::SeqCst);
    }
}

impl PlanSource for MemoryPlanSource {
    fn is_empty(&self) -> bool {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn get_source(&self) -> Result<Vec<u8>> {
        Ok(self.buffer.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn check_for_update(&self) -> bool {
        self.updated.swap(false, Ordering::SeqCst)
    }

    fn throttle(&self) -> &UpdateThrottle {
        &self.throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_second_check_inside_interval_is_false() {
        let source = MemoryPlanSource::new(HOUR);
        source.copy_from(b"{}");

        assert!(source.has_updated_plan());

        source.copy_from(b"{\"name\":\"changed\"}");
        assert!(!source.has_updated_plan());
    }

    #[test]
    fn test_first_check_without_changes() {
        let source = MemoryPlanSource::with_content(b"{}".to_vec(), HOUR);
        assert!(!source.has_updated_plan());
    }

    #[test]
    fn test_reload_forces_update() {
        let source = MemoryPlanSource::with_content(b"{}".to_vec(), HOUR);
        assert!(!source.has_updated_plan());

        source.reload();
        assert!(source.has_updated_plan());
        assert!(!source.has_updated_plan());
    }

    #[test]
    fn test_zero_interval_checks_every_time() {
        let source = MemoryPlanSource::new(Duration::ZERO);
        source.copy_from(b"a");
        assert!(source.has_updated_plan());
        source.copy_from(b"b");
        assert!(source.has_updated_plan());
        assert!(!source.has_updated_plan());
    }

    #[test]
    fn test_memory_source_snapshots() {
        let source = MemoryPlanSource::new(HOUR);
        assert!(source.is_empty());

        source.copy_from(b"first");
        let snapshot = source.get_source().unwrap();
        source.copy_from(b"second");

        assert_eq!(snapshot, b"first");
        assert_eq!(source.get_source().unwrap(), b"second");
    }

    #[test]
    fn test_memory_source_concurrent_access() {
        let source = Arc::new(MemoryPlanSource::new(HOUR));

        let writer = {
            let source = Arc::clone(&source);
            std::thread::spawn(move || {
                for i in 0..100u8 {
                    source.copy_from(&[i; 16]);
                }
            })
        };

        for _ in 0..100 {
            let snapshot = source.get_source().unwrap();
            assert!(snapshot.is_empty() || snapshot.iter().all(|b| *b == snapshot[0]));
        }

        writer.join().unwrap();
        assert_eq!(source.get_source().unwrap(), vec![99u8; 16]);
    }

    #[test]
    fn test_file_source_rereads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, b"one").unwrap();

        let source = FilePlanSource::new(&path, HOUR).unwrap();
        assert!(!source.is_empty());
        assert_eq!(source.get_source().unwrap(), b"one");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"two").unwrap();
        drop(file);

        assert_eq!(source.get_source().unwrap(), b"two");
    }

    #[test]
    fn test_file_source_reports_watched_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, b"one").unwrap();

        let source = FilePlanSource::new(&path, HOUR).unwrap();
        std::fs::write(&path, b"two").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !source.updated.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        assert!(source.has_updated_plan());
        assert!(!source.has_updated_plan());
        assert_eq!(source.get_source().unwrap(), b"two");
    }

    #[test]
    fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilePlanSource::new(dir.path().join("absent.json"), HOUR).unwrap();

        assert!(source.is_empty());
        assert!(source.get_source().is_err());
    }
}
