//! Reference-counted mount factory.
//!
//! Hands out shared mounts keyed by `(kind, canonical identity)` so the same
//! physical folder or archive is never opened twice. Every issued
//! [`MountHandle`] holds one reference; the underlying mount is disposed
//! exactly once, when the last reference is released.
//!
//! Concurrent requests for a key that is still being built join the same
//! in-flight build instead of starting a second one.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::MountError;
use crate::host::HostFs;
use crate::mount::{ArchiveMount, FolderMount, Mount, MountKind, WildcardMount};

/// Default capacity of each folder mount's watch fan-out.
pub const DEFAULT_WATCH_BUFFER: usize = 256;

type BuildFuture = Shared<BoxFuture<'static, Result<Arc<Mount>, MountError>>>;

struct Entry {
    id: u64,
    references: usize,
    build: BuildFuture,
}

type Table = HashMap<MountKind, HashMap<PathBuf, Entry>>;

struct FactoryInner {
    host: Arc<dyn HostFs>,
    watch_buffer: usize,
    table: Mutex<Table>,
    next_id: AtomicU64,
    builds: AtomicUsize,
    disposals: AtomicUsize,
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryStats {
    /// Builds started.
    pub builds: usize,
    /// Underlying mounts disposed.
    pub disposals: usize,
    /// Entries currently in the table, built or in flight.
    pub live: usize,
}

/// Shared, reference-counted mount cache.
#[derive(Clone)]
pub struct MountPointFactory {
    inner: Arc<FactoryInner>,
}

/// A non-owning reference to a factory, held by wildcard mounts that the
/// factory itself owns.
#[derive(Clone)]
pub(crate) struct WeakFactory(Weak<FactoryInner>);

impl WeakFactory {
    pub(crate) fn upgrade(&self) -> Option<MountPointFactory> {
        self.0.upgrade().map(|inner| MountPointFactory { inner })
    }
}

impl fmt::Debug for MountPointFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPointFactory")
            .field("stats", &self.stats())
            .finish()
    }
}

impl MountPointFactory {
    pub fn new(host: Arc<dyn HostFs>) -> Self {
        Self::with_watch_buffer(host, DEFAULT_WATCH_BUFFER)
    }

    pub fn with_watch_buffer(host: Arc<dyn HostFs>, watch_buffer: usize) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                host,
                watch_buffer,
                table: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                builds: AtomicUsize::new(0),
                disposals: AtomicUsize::new(0),
            }),
        }
    }

    pub fn host(&self) -> &Arc<dyn HostFs> {
        &self.inner.host
    }

    pub(crate) fn downgrade(&self) -> WeakFactory {
        WeakFactory(Arc::downgrade(&self.inner))
    }

    /// A shared folder mount for the directory at `path`.
    pub async fn folder(&self, path: &Path) -> Result<MountHandle, MountError> {
        let identity = self.inner.host.canonicalize(path).await;
        let host = self.inner.host.clone();
        let watch_buffer = self.inner.watch_buffer;
        let root = identity.clone();

        self.get(MountKind::Folder, identity, move || async move {
            FolderMount::new(host, &root, watch_buffer)
                .await
                .map(Mount::Folder)
        })
        .await
    }

    /// A shared archive mount for the VPK directory file at `path`.
    pub async fn archive(&self, path: &Path) -> Result<MountHandle, MountError> {
        let identity = self.inner.host.canonicalize(path).await;
        let host = self.inner.host.clone();
        let file = identity.clone();

        self.get(MountKind::Archive, identity, move || async move {
            ArchiveMount::new(host, &file).await.map(Mount::Archive)
        })
        .await
    }

    /// A shared wildcard mount for `path`, which must end in `*`.
    pub async fn wildcard(&self, path: &Path) -> Result<MountHandle, MountError> {
        let parent = crate::mount::wildcard_parent(path)
            .ok_or_else(|| MountError::NotAWildcard(path.to_path_buf()))?;
        let identity = self.inner.host.canonicalize(&parent).await.join("*");
        let host = self.inner.host.clone();
        let factory = self.downgrade();
        let pattern = identity.clone();

        self.get(MountKind::Wildcard, identity, move || async move {
            WildcardMount::new(factory, host, &pattern)
                .await
                .map(Mount::Wildcard)
        })
        .await
    }

    /// Take a reference on `(kind, identity)`, building it with `build` if no
    /// entry exists.
    ///
    /// The reference is counted before the build is awaited. A failed build
    /// leaves no entry behind, and every caller waiting on it gets the error.
    pub async fn get<F, Fut>(
        &self,
        kind: MountKind,
        identity: PathBuf,
        build: F,
    ) -> Result<MountHandle, MountError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Mount, MountError>> + Send + 'static,
    {
        let (id, future) = {
            let mut table = self.inner.lock();
            let slot = table.entry(kind).or_default();
            match slot.get_mut(&identity) {
                Some(entry) => {
                    entry.references += 1;
                    (entry.id, entry.build.clone())
                }
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    self.inner.builds.fetch_add(1, Ordering::Relaxed);
                    let future = build().map(|result| result.map(Arc::new)).boxed().shared();
                    slot.insert(
                        identity.clone(),
                        Entry {
                            id,
                            references: 1,
                            build: future.clone(),
                        },
                    );
                    tracing::debug!(%kind, identity = %identity.display(), "building mount");
                    (id, future)
                }
            }
        };

        // Dropping this (the caller gave up) returns the reference
        let lease = Lease {
            factory: Arc::downgrade(&self.inner),
            kind,
            identity,
            id,
            released: AtomicBool::new(false),
        };

        match future.await {
            Ok(mount) => Ok(MountHandle { mount, lease }),
            Err(error) => {
                lease.released.store(true, Ordering::SeqCst);
                let removed = self.inner.remove_failed(kind, &lease.identity, id);
                drop(removed);
                Err(error)
            }
        }
    }

    pub fn stats(&self) -> FactoryStats {
        let live = self.inner.lock().values().map(HashMap::len).sum();
        FactoryStats {
            builds: self.inner.builds.load(Ordering::Relaxed),
            disposals: self.inner.disposals.load(Ordering::Relaxed),
            live,
        }
    }

    /// Outstanding references on `(kind, identity)`; 0 if there is no entry.
    pub fn references(&self, kind: MountKind, identity: &Path) -> usize {
        self.inner
            .lock()
            .get(&kind)
            .and_then(|slot| slot.get(identity))
            .map_or(0, |entry| entry.references)
    }
}

impl FactoryInner {
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an entry out of the table. The caller drops it after the lock is
    /// released, since dropping a build can release other leases.
    fn take(table: &mut Table, kind: MountKind, identity: &Path) -> Option<Entry> {
        let slot = table.get_mut(&kind)?;
        let entry = slot.remove(identity);
        if slot.is_empty() {
            table.remove(&kind);
        }
        entry
    }

    fn remove_failed(&self, kind: MountKind, identity: &Path, id: u64) -> Option<Entry> {
        let mut table = self.lock();
        let current = table.get(&kind)?.get(identity)?;
        if current.id != id {
            return None;
        }
        tracing::debug!(%kind, identity = %identity.display(), "mount build failed");
        Self::take(&mut table, kind, identity)
    }

    fn release(&self, kind: MountKind, identity: &Path, id: u64) {
        let entry = {
            let mut table = self.lock();
            let Some(entry) = table.get_mut(&kind).and_then(|slot| slot.get_mut(identity)) else {
                return;
            };
            if entry.id != id {
                return;
            }
            entry.references = entry.references.saturating_sub(1);
            if entry.references > 0 {
                return;
            }
            Self::take(&mut table, kind, identity)
        };

        let built = entry
            .as_ref()
            .and_then(|entry| entry.build.peek())
            .and_then(|result| result.as_ref().ok().cloned());
        if let Some(mount) = built {
            self.disposals.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%kind, identity = %identity.display(), "disposing mount");
            mount.dispose();
        }
    }
}

/// One reference on a factory entry.
struct Lease {
    factory: Weak<FactoryInner>,
    kind: MountKind,
    identity: PathBuf,
    id: u64,
    released: AtomicBool,
}

impl Lease {
    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(factory) = self.factory.upgrade() {
            factory.release(self.kind, &self.identity, self.id);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

/// A factory-issued reference to a shared mount.
///
/// Forwards to the shared mount. [`dispose`](Self::dispose) (or dropping the
/// handle) returns the reference; only the first call counts.
pub struct MountHandle {
    mount: Arc<Mount>,
    lease: Lease,
}

impl MountHandle {
    /// The shared mount.
    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    /// The key's kind.
    pub fn kind(&self) -> MountKind {
        self.lease.kind
    }

    /// The key's canonical identity.
    pub fn identity(&self) -> &Path {
        &self.lease.identity
    }

    pub fn dispose(&self) {
        self.lease.release();
    }
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("kind", &self.lease.kind)
            .field("identity", &self.lease.identity)
            .field("released", &self.lease.released.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;
    use crate::mount::CompositeMount;
    use std::time::Duration;

    fn factory() -> (Arc<MemoryFs>, MountPointFactory) {
        let fs = Arc::new(MemoryFs::new());
        (fs.clone(), MountPointFactory::new(fs))
    }

    #[tokio::test]
    async fn test_same_folder_shared() {
        let (fs, factory) = factory();
        fs.mkdir("/game/tf").await.unwrap();

        let a = factory.folder(Path::new("/game/tf")).await.unwrap();
        let b = factory.folder(Path::new("/game/./tf/")).await.unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(factory.references(MountKind::Folder, Path::new("/game/tf")), 2);
        assert_eq!(factory.stats().builds, 1);
    }

    #[tokio::test]
    async fn test_last_release_disposes_once() {
        let (fs, factory) = factory();
        fs.mkdir("/game/tf").await.unwrap();

        let handles = vec![
            factory.folder(Path::new("/game/tf")).await.unwrap(),
            factory.folder(Path::new("/game/tf")).await.unwrap(),
            factory.folder(Path::new("/game/tf")).await.unwrap(),
        ];

        for handle in &handles {
            assert_eq!(factory.stats().disposals, 0);
            handle.dispose();
            // A second dispose on the same handle is ignored
            handle.dispose();
        }

        assert_eq!(
            factory.stats(),
            FactoryStats {
                builds: 1,
                disposals: 1,
                live: 0
            }
        );
        drop(handles);
        assert_eq!(factory.stats().disposals, 1);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let (fs, factory) = factory();
        fs.mkdir("/a").await.unwrap();

        let handle = factory.folder(Path::new("/a")).await.unwrap();
        assert_eq!(factory.stats().live, 1);
        drop(handle);
        assert_eq!(factory.stats().live, 0);
        assert_eq!(factory.stats().disposals, 1);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_entry() {
        let (fs, factory) = factory();
        fs.write("/file.txt", "x").await.unwrap();

        let err = factory.folder(Path::new("/file.txt")).await.unwrap_err();
        assert!(matches!(err, MountError::NotADirectory(_)));
        assert!(factory.folder(Path::new("/missing")).await.unwrap_err().is_not_found());
        assert_eq!(factory.stats().live, 0);
        assert_eq!(factory.stats().disposals, 0);
    }

    #[tokio::test]
    async fn test_concurrent_gets_coalesce() {
        let (_fs, factory) = factory();
        let slow = || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Mount::Composite(CompositeMount::new(Vec::new())))
        };

        let id = PathBuf::from("/virtual");
        let (a, b, c) = tokio::join!(
            factory.get(MountKind::Composite, id.clone(), slow),
            factory.get(MountKind::Composite, id.clone(), slow),
            factory.get(MountKind::Composite, id.clone(), slow),
        );
        let handles = [a.unwrap(), b.unwrap(), c.unwrap()];

        assert_eq!(factory.stats().builds, 1);
        assert_eq!(factory.references(MountKind::Composite, &id), 3);
        assert!(std::ptr::eq(handles[0].mount(), handles[2].mount()));

        drop(handles);
        assert_eq!(factory.stats().disposals, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failure_reaches_every_caller() {
        let (_fs, factory) = factory();
        let failing = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<Mount, _>(MountError::NotFound(PathBuf::from("/gone")))
        };

        let id = PathBuf::from("/gone");
        let (a, b) = tokio::join!(
            factory.get(MountKind::Folder, id.clone(), failing),
            factory.get(MountKind::Folder, id.clone(), failing),
        );
        assert!(a.unwrap_err().is_not_found());
        assert!(b.unwrap_err().is_not_found());
        assert_eq!(factory.stats().builds, 1);
        assert_eq!(factory.stats().live, 0);
    }

    #[tokio::test]
    async fn test_abandoned_get_returns_reference() {
        let (_fs, factory) = factory();
        let never = || async { std::future::pending::<Result<Mount, MountError>>().await };

        let id = PathBuf::from("/pending");
        let attempt = tokio::time::timeout(
            Duration::from_millis(10),
            factory.get(MountKind::Folder, id.clone(), never),
        )
        .await;
        assert!(attempt.is_err());
        assert_eq!(factory.references(MountKind::Folder, &id), 0);
        assert_eq!(factory.stats().live, 0);
    }
}
