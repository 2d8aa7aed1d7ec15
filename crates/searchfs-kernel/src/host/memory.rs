//! In-memory host filesystem.
//!
//! Used for tests. All data is ephemeral. Mutations emit the same watch
//! events a disk watcher would, so mounts can be driven deterministically.

use super::traits::{DirEntry, EntryKind, HostFs, HostWatcher, Metadata, WatchEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tokio::sync::{mpsc, RwLock};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

#[derive(Debug)]
struct Subscription {
    root: PathBuf,
    recursive: bool,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl Subscription {
    fn covers(&self, path: &Path) -> bool {
        if self.recursive {
            path.starts_with(&self.root) && path != self.root
        } else {
            path.parent() == Some(self.root.as_path())
        }
    }
}

/// In-memory filesystem.
///
/// Thread-safe via internal locks. Paths are normalized so `/a/b`, `a/b` and
/// `a/./b` name the same entry; watch events always carry the absolute form.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    watchers: Mutex<Vec<Subscription>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                modified: SystemTime::now(),
            },
        );
        Self {
            entries: RwLock::new(entries),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Normalize a path: remove the root, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    fn absolute(normalized: &Path) -> PathBuf {
        Path::new("/").join(normalized)
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("not found: {}", path.display()),
        )
    }

    /// Insert missing parent directories, returning the ones created.
    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        let mut current = PathBuf::new();

        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            current.push(component);
            match entries.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("not a directory: {}", current.display()),
                    ));
                }
                None => {
                    entries.insert(
                        current.clone(),
                        Entry::Directory {
                            modified: SystemTime::now(),
                        },
                    );
                    created.push(current.clone());
                }
            }
        }
        Ok(created)
    }

    /// Deliver events to every watcher covering them, dropping closed ones.
    fn emit(&self, events: Vec<WatchEvent>) {
        if events.is_empty() {
            return;
        }
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        watchers.retain(|sub| {
            events
                .iter()
                .filter(|event| sub.covers(&event.path))
                .all(|event| sub.tx.send(event.clone()).is_ok())
                && !sub.tx.is_closed()
        });
    }

    /// Write a file, creating parent directories as needed.
    pub async fn write(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> io::Result<()> {
        let path = path.as_ref();
        let normalized = Self::normalize(path);

        let events = {
            let mut entries = self.entries.write().await;

            if let Some(Entry::Directory { .. }) = entries.get(&normalized) {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("is a directory: {}", path.display()),
                ));
            }

            let mut events: Vec<WatchEvent> = Self::ensure_parents(&mut entries, &normalized)?
                .iter()
                .map(|dir| WatchEvent::created(Self::absolute(dir)))
                .collect();

            let existed = entries
                .insert(
                    normalized.clone(),
                    Entry::File {
                        data: data.into(),
                        modified: SystemTime::now(),
                    },
                )
                .is_some();
            let absolute = Self::absolute(&normalized);
            events.push(if existed {
                WatchEvent::modified(absolute)
            } else {
                WatchEvent::created(absolute)
            });
            events
        };

        self.emit(events);
        Ok(())
    }

    /// Create a directory and any missing parents.
    pub async fn mkdir(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let normalized = Self::normalize(path);

        let events = {
            let mut entries = self.entries.write().await;

            match entries.get(&normalized) {
                Some(Entry::Directory { .. }) => return Ok(()),
                Some(Entry::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("file exists: {}", path.display()),
                    ));
                }
                None => {}
            }

            let mut events: Vec<WatchEvent> = Self::ensure_parents(&mut entries, &normalized)?
                .iter()
                .map(|dir| WatchEvent::created(Self::absolute(dir)))
                .collect();
            entries.insert(
                normalized.clone(),
                Entry::Directory {
                    modified: SystemTime::now(),
                },
            );
            events.push(WatchEvent::created(Self::absolute(&normalized)));
            events
        };

        self.emit(events);
        Ok(())
    }

    /// Remove a file or a directory with everything under it.
    pub async fn remove(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let normalized = Self::normalize(path);

        if normalized.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root directory",
            ));
        }

        let events = {
            let mut entries = self.entries.write().await;
            if !entries.contains_key(&normalized) {
                return Err(Self::not_found(path));
            }

            let mut doomed: Vec<PathBuf> = entries
                .keys()
                .filter(|k| k.starts_with(&normalized))
                .cloned()
                .collect();
            // Deepest first, like a recursive delete reports them
            doomed.sort_by(|a, b| b.components().count().cmp(&a.components().count()).then(a.cmp(b)));

            for p in &doomed {
                entries.remove(p);
            }
            doomed
                .iter()
                .map(|p| WatchEvent::deleted(Self::absolute(p)))
                .collect()
        };

        self.emit(events);
        Ok(())
    }

    /// Number of live watch registrations.
    pub fn watcher_count(&self) -> usize {
        self.watchers
            .lock()
            .map(|mut w| {
                w.retain(|sub| !sub.tx.is_closed());
                w.len()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl HostFs for MemoryFs {
    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let entries = self.entries.read().await;
        match entries.get(&Self::normalize(path)) {
            Some(Entry::File { data, modified }) => Ok(Metadata {
                kind: EntryKind::File,
                size: data.len() as u64,
                modified: Some(*modified),
            }),
            Some(Entry::Directory { modified }) => Ok(Metadata {
                kind: EntryKind::Directory,
                size: 0,
                modified: Some(*modified),
            }),
            None => Err(Self::not_found(path)),
        }
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let entries = self.entries.read().await;
        match entries.get(&Self::normalize(path)) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let entries = self.entries.read().await;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", path.display()),
                ));
            }
            None => return Err(Self::not_found(path)),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(normalized.as_path()))
            .filter_map(|(p, entry)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(match entry {
                    Entry::File { .. } => DirEntry::file(name),
                    Entry::Directory { .. } => DirEntry::directory(name),
                })
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn canonicalize(&self, path: &Path) -> PathBuf {
        Self::absolute(&Self::normalize(path))
    }

    fn watch(&self, path: &Path, recursive: bool) -> io::Result<HostWatcher> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watchers = self
            .watchers
            .lock()
            .map_err(|_| io::Error::other("watcher table poisoned"))?;
        watchers.push(Subscription {
            root: Self::absolute(&Self::normalize(path)),
            recursive,
            tx,
        });
        Ok(HostWatcher::new(rx))
    }
}
