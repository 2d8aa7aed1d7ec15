//! Core host filesystem traits and types.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// Kind of a host entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// A directory entry: name plus kind.
///
/// Also the element type of mount listings, where `name` may be a relative
/// path (recursive listings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Result of `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    /// Contents changed or a writer closed the file.
    Modified,
    Deleted,
}

/// One change notification. `path` is in the same form the watch was
/// registered with (the host's absolute form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Created,
            path: path.into(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Modified,
            path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Deleted,
            path: path.into(),
        }
    }
}

/// A live watch registration.
///
/// Events arrive in the order the host observed them. Dropping the watcher
/// stops the underlying registration.
pub struct HostWatcher {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    _registration: Option<Box<dyn Send>>,
}

impl HostWatcher {
    /// A watcher fed only by `events`.
    pub fn new(events: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self {
            events,
            _registration: None,
        }
    }

    /// A watcher that also keeps `registration` alive until dropped.
    pub fn with_registration(
        events: mpsc::UnboundedReceiver<WatchEvent>,
        registration: impl Send + 'static,
    ) -> Self {
        Self {
            events,
            _registration: Some(Box::new(registration)),
        }
    }

    /// Next event, or `None` once the host side has gone away.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Next already-delivered event, without waiting.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }
}

impl std::fmt::Debug for HostWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostWatcher")
            .field("registered", &self._registration.is_some())
            .finish()
    }
}

/// Read-only host filesystem capability consumed by the mounts.
///
/// Paths are host paths (absolute for `LocalFs`; `MemoryFs` accepts either
/// form). Errors use `io::ErrorKind::{NotFound, NotADirectory, IsADirectory}`
/// for the structural cases the mounts care about.
#[async_trait]
pub trait HostFs: Send + Sync {
    /// Metadata for a file or directory, following symlinks.
    async fn stat(&self, path: &Path) -> io::Result<Metadata>;

    /// Read the entire contents of a file.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Read `len` bytes starting at `offset`.
    ///
    /// Short reads at end of file return fewer bytes. The default reads the
    /// whole file and slices it.
    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let data = self.read(path).await?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    /// List entries in a directory.
    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Resolve a path to the form watch events will report.
    ///
    /// The default returns the path unchanged.
    async fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Watch a directory for creations and deletions.
    ///
    /// With `recursive`, events for every descendant are reported; otherwise
    /// only direct children.
    fn watch(&self, path: &Path, recursive: bool) -> io::Result<HostWatcher>;
}
