//! Folder mounts: one host directory, watched recursively.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::listing::{read_listing, DirSource};
use super::ReadDirOptions;
use crate::error::MountError;
use crate::host::{DirEntry, HostFs, WatchEvent, WatchEventKind};
use crate::live::{publish, Cell, LiveFile, PathTable};
use crate::location::{normalize_relative, Location, Resolution};

/// Resolves paths against a single host directory.
///
/// One recursive watcher feeds a broadcast channel; each live path
/// subscribes to it and reacts only to events for its own path (or an
/// ancestor of it).
#[derive(Clone)]
pub struct FolderMount {
    inner: Arc<FolderInner>,
}

struct FolderInner {
    root: PathBuf,
    host: Arc<dyn HostFs>,
    events: broadcast::Sender<WatchEvent>,
    paths: PathTable,
    cancel: CancellationToken,
}

impl Drop for FolderInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for FolderMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderMount")
            .field("root", &self.inner.root)
            .field("live_paths", &self.inner.paths.len())
            .finish()
    }
}

impl FolderMount {
    /// Mount `root`, which must be an existing directory.
    ///
    /// A watcher that fails to start is logged; the mount then resolves
    /// correctly but without live updates.
    pub async fn new(
        host: Arc<dyn HostFs>,
        root: &Path,
        watch_buffer: usize,
    ) -> Result<Self, MountError> {
        let meta = host
            .stat(root)
            .await
            .map_err(|e| MountError::from_io(root, e))?;
        if !meta.is_dir() {
            return Err(MountError::NotADirectory(root.to_path_buf()));
        }

        let root = host.canonicalize(root).await;
        let (events, _) = broadcast::channel(watch_buffer.max(1));
        let cancel = CancellationToken::new();

        match host.watch(&root, true) {
            Ok(mut watcher) => {
                let events = events.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            event = watcher.recv() => match event {
                                // No receivers just means no live paths right now
                                Some(event) => { let _ = events.send(event); }
                                None => break,
                            },
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "watcher failed to start; no live updates");
            }
        }

        tracing::debug!(root = %root.display(), "folder mounted");

        Ok(Self {
            inner: Arc::new(FolderInner {
                root,
                host,
                events,
                paths: PathTable::default(),
                cancel,
            }),
        })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Number of paths currently being tracked.
    pub fn live_paths(&self) -> usize {
        self.inner.paths.len()
    }

    pub fn resolve_file(&self, path: &str) -> LiveFile {
        let rel = normalize_relative(path);
        let inner = self.inner.clone();
        self.inner
            .paths
            .subscribe(rel.clone(), move |tx| track_path(inner, rel, tx))
    }

    pub async fn read_directory(
        &self,
        path: &str,
        opts: &ReadDirOptions,
    ) -> Result<Vec<DirEntry>, MountError> {
        read_listing(self.inner.as_ref(), &normalize_relative(path), opts).await
    }

    pub fn dispose(&self) {
        tracing::debug!(root = %self.inner.root.display(), "folder disposed");
        self.inner.cancel.cancel();
    }
}

impl FolderInner {
    fn host_path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    /// One-shot resolution of a host path. Anything but a file is absent.
    async fn stat_file(&self, target: &Path) -> Resolution {
        match self.host.stat(target).await {
            Ok(meta) if meta.is_file() => Some(Location::Host(target.to_path_buf())),
            Ok(_) => {
                tracing::warn!(path = %target.display(), "directory found where a file was expected");
                None
            }
            Err(e) => {
                tracing::debug!(path = %target.display(), error = %e, "not resolved");
                None
            }
        }
    }
}

/// Driver for one path: initial stat, then watcher events.
async fn track_path(inner: Arc<FolderInner>, rel: String, tx: watch::Sender<Cell>) {
    let target = inner.host_path(&rel);
    // Subscribe before the stat so nothing between the two is missed
    let mut events = inner.events.subscribe();
    publish(&tx, inner.stat_file(&target).await);

    loop {
        match events.recv().await {
            Ok(event) if target.starts_with(&event.path) => match event.kind {
                WatchEventKind::Deleted => publish(&tx, None),
                WatchEventKind::Created | WatchEventKind::Modified => {
                    publish(&tx, inner.stat_file(&target).await)
                }
            },
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(path = %target.display(), missed, "watch events dropped; re-checking");
                publish(&tx, inner.stat_file(&target).await);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl DirSource for FolderInner {
    async fn list_dir(&self, dir: &str) -> Result<Option<Vec<DirEntry>>, MountError> {
        let path = self.host_path(dir);
        match self.host.list(&path).await {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => match MountError::from_io(&path, e) {
                MountError::NotFound(_) => Ok(None),
                other => {
                    // A file where a directory was asked for lists as empty
                    match self.host.stat(&path).await {
                        Ok(meta) if meta.is_file() => Ok(None),
                        _ => Err(other),
                    }
                }
            },
        }
    }
}
