//! Wildcard mounts: every subdirectory and archive in a directory, as a
//! dynamic, name-ordered set of child mounts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::children::{Named, SortedChildren};
use super::merge::{merge_into, union_listings};
use super::{Mount, ReadDirOptions};
use crate::error::MountError;
use crate::factory::WeakFactory;
use crate::host::{DirEntry, EntryKind, HostFs, HostWatcher, WatchEventKind};
use crate::live::{Cell, LiveFile, PathTable};
use crate::location::normalize_relative;

/// The directory a wildcard path like `tf/custom/*` ranges over.
pub(crate) fn wildcard_parent(path: &Path) -> Option<PathBuf> {
    if path.file_name()? != "*" {
        return None;
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
        _ => Some(PathBuf::from(".")),
    }
}

/// Whether a file in a wildcard directory should be mounted as an archive.
///
/// Numbered part files (`pak01_000.vpk`) hold data for a `_dir.vpk` and are
/// not archives on their own.
fn is_archive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let Some(stem) = lower.strip_suffix(".vpk") else {
        return false;
    };
    let is_part = stem.len() > 4
        && stem.as_bytes()[stem.len() - 4] == b'_'
        && stem[stem.len() - 3..].bytes().all(|b| b.is_ascii_digit());
    !is_part
}

/// Resolves paths against whatever children currently exist, in name order.
#[derive(Clone)]
pub struct WildcardMount {
    inner: Arc<WildcardInner>,
}

struct WildcardInner {
    parent: PathBuf,
    children: watch::Sender<SortedChildren>,
    paths: PathTable,
    cancel: CancellationToken,
}

impl Drop for WildcardInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for WildcardMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildcardMount")
            .field("parent", &self.inner.parent)
            .field("children", &self.children())
            .finish()
    }
}

/// Builds child mounts through the factory.
#[derive(Clone)]
struct ChildBuilder {
    factory: WeakFactory,
    host: Arc<dyn HostFs>,
    parent: PathBuf,
}

impl ChildBuilder {
    async fn build(&self, name: &str, kind: EntryKind) -> Option<Arc<Mount>> {
        let path = self.parent.join(name);
        let is_archive = match kind {
            EntryKind::Directory => false,
            EntryKind::File if is_archive_name(name) => true,
            EntryKind::File => return None,
        };

        let Some(factory) = self.factory.upgrade() else {
            tracing::debug!(path = %path.display(), "factory gone; not building child");
            return None;
        };
        let result = if is_archive {
            factory.archive(&path).await
        } else {
            factory.folder(&path).await
        };

        match result {
            Ok(handle) => Some(Arc::new(Mount::Shared(handle))),
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "wildcard child vanished before mounting");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping wildcard child");
                None
            }
        }
    }
}

impl WildcardMount {
    /// Mount the directory named by `path` (which must end in `*`).
    ///
    /// The directory is scanned once; afterwards a non-recursive watcher
    /// adds and removes children as entries come and go.
    pub(crate) async fn new(
        factory: WeakFactory,
        host: Arc<dyn HostFs>,
        path: &Path,
    ) -> Result<Self, MountError> {
        let parent =
            wildcard_parent(path).ok_or_else(|| MountError::NotAWildcard(path.to_path_buf()))?;
        let meta = host
            .stat(&parent)
            .await
            .map_err(|e| MountError::from_io(&parent, e))?;
        if !meta.is_dir() {
            return Err(MountError::NotADirectory(parent));
        }
        let parent = host.canonicalize(&parent).await;

        // Watch before scanning so entries created during the scan are seen
        let watcher = match host.watch(&parent, false) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(dir = %parent.display(), error = %e, "watcher failed to start; wildcard membership is fixed");
                None
            }
        };

        let listing = host
            .list(&parent)
            .await
            .map_err(|e| MountError::from_io(&parent, e))?;

        let builder = ChildBuilder {
            factory,
            host,
            parent: parent.clone(),
        };
        let built = join_all(listing.iter().map(|entry| builder.build(&entry.name, entry.kind))).await;

        let mut children = SortedChildren::new();
        for (entry, mount) in listing.into_iter().zip(built) {
            let Some(mount) = mount else {
                continue;
            };
            if let Err(duplicate) = children.insert(entry.name, mount) {
                duplicate.value.dispose();
            }
        }
        tracing::debug!(dir = %parent.display(), children = children.len(), "wildcard mounted");

        let (children, _) = watch::channel(children);
        let inner = Arc::new(WildcardInner {
            parent,
            children,
            paths: PathTable::default(),
            cancel: CancellationToken::new(),
        });

        if let Some(watcher) = watcher {
            tokio::spawn(follow_membership(
                Arc::downgrade(&inner),
                builder,
                watcher,
                inner.cancel.clone(),
            ));
        }

        Ok(Self { inner })
    }

    /// The directory this wildcard ranges over.
    pub fn parent(&self) -> &Path {
        &self.inner.parent
    }

    /// Current child names, in priority order.
    pub fn children(&self) -> Vec<String> {
        self.inner.children.borrow().names().map(String::from).collect()
    }

    pub fn resolve_file(&self, path: &str) -> LiveFile {
        let rel = normalize_relative(path);
        let children = self.inner.children.subscribe();
        self.inner
            .paths
            .subscribe(rel.clone(), move |tx| follow_children(children, rel, tx))
    }

    pub async fn read_directory(
        &self,
        path: &str,
        opts: &ReadDirOptions,
    ) -> Result<Vec<DirEntry>, MountError> {
        let mounts: Vec<Arc<Mount>> = self
            .inner
            .children
            .borrow()
            .iter()
            .map(|child| child.value.clone())
            .collect();
        Ok(union_listings(&mounts, path, opts).await)
    }

    pub fn dispose(&self) {
        self.inner.cancel.cancel();

        let mut removed = Vec::new();
        self.inner.children.send_modify(|children| removed.extend(children.drain()));
        for child in removed {
            child.value.dispose();
        }
        tracing::debug!(dir = %self.inner.parent.display(), "wildcard disposed");
    }
}

/// Apply watcher events to the child set until cancelled.
async fn follow_membership(
    inner: Weak<WildcardInner>,
    builder: ChildBuilder,
    mut watcher: HostWatcher,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = watcher.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if event.path.parent() != Some(builder.parent.as_path()) {
            continue;
        }
        let Some(name) = event.path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match event.kind {
            // A write to an entry that is not a child yet (an archive still
            // being copied in, say) is another chance to mount it
            WatchEventKind::Created | WatchEventKind::Modified => {
                let exists = inner.children.borrow().contains(&name);
                if exists {
                    continue;
                }
                let kind = match builder.host.stat(&event.path).await {
                    Ok(meta) => meta.kind,
                    Err(e) => {
                        tracing::debug!(path = %event.path.display(), error = %e, "created entry already gone");
                        continue;
                    }
                };
                let Some(mount) = builder.build(&name, kind).await else {
                    continue;
                };
                if cancel.is_cancelled() {
                    mount.dispose();
                    break;
                }

                let mut rejected = None;
                inner.children.send_modify(|children| {
                    rejected = children.insert(name.clone(), mount).err();
                });
                match rejected {
                    Some(duplicate) => duplicate.value.dispose(),
                    None => tracing::debug!(child = %name, "wildcard child added"),
                }
            }
            WatchEventKind::Deleted => {
                let mut removed = None;
                inner.children.send_if_modified(|children| {
                    removed = children.remove(&name);
                    removed.is_some()
                });
                if let Some(child) = removed {
                    child.value.dispose();
                    tracing::debug!(child = %name, "wildcard child removed");
                }
            }
        }
    }
}

/// One merge input, remembered so it survives membership changes.
struct Input {
    name: String,
    mount: Arc<Mount>,
    live: LiveFile,
}

/// Driver for one path: merge the current children, re-merging whenever the
/// child set changes.
async fn follow_children(
    mut children: watch::Receiver<SortedChildren>,
    rel: String,
    tx: watch::Sender<Cell>,
) {
    let mut inputs: Vec<Input> = Vec::new();

    loop {
        let snapshot: Vec<Named<Arc<Mount>>> = children.borrow_and_update().iter().cloned().collect();

        // Keep existing cells for children that are still present
        let mut previous = std::mem::take(&mut inputs);
        for child in snapshot {
            let kept = previous
                .iter()
                .position(|input| input.name == child.name && Arc::ptr_eq(&input.mount, &child.value));
            let input = match kept {
                Some(at) => previous.swap_remove(at),
                None => Input {
                    live: child.value.resolve_file(&rel),
                    name: child.name,
                    mount: child.value,
                },
            };
            inputs.push(input);
        }
        drop(previous);

        let mut cells: Vec<LiveFile> = inputs.iter().map(|input| input.live.clone()).collect();
        tokio::select! {
            changed = children.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = async {
                merge_into(&tx, &mut cells).await;
                std::future::pending::<()>().await
            } => {}
        }
    }
}
