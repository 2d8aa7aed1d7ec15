//! Local filesystem host.
//!
//! Reads go through `tokio::fs`; watches go through `notify`.

use super::traits::{DirEntry, EntryKind, HostFs, HostWatcher, Metadata, WatchEvent};
use async_trait::async_trait;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

use crate::location::normalize_path;

/// Real filesystem access. Paths are used as given.
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    fn kind_of(meta: &std::fs::Metadata) -> EntryKind {
        // Sockets, pipes and devices are reported as files; nothing here reads them.
        if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

#[async_trait]
impl HostFs for LocalFs {
    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let meta = fs::metadata(path).await?;
        Ok(Metadata {
            kind: Self::kind_of(&meta),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
        })
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut file = fs::File::open(path).await?;
        file.seek(io::SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;

        while let Some(entry) = dir.next_entry().await? {
            // Follow symlinks; dangling links are skipped
            let Ok(meta) = fs::metadata(entry.path()).await else {
                continue;
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: Self::kind_of(&meta),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn canonicalize(&self, path: &Path) -> PathBuf {
        // Canonicalize so the stored root matches what notify reports.
        fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| normalize_path(path))
    }

    fn watch(&self, path: &Path, recursive: bool) -> io::Result<HostWatcher> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for change in translate(event) {
                        // Receiver gone means the watcher is being torn down
                        let _ = tx.send(change);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "File watcher error");
                }
            },
        )
        .map_err(to_io)?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(path, mode).map_err(to_io)?;

        Ok(HostWatcher::with_registration(rx, watcher))
    }
}

fn to_io(error: notify::Error) -> io::Error {
    match error.kind {
        notify::ErrorKind::Io(e) => e,
        notify::ErrorKind::PathNotFound => io::Error::new(io::ErrorKind::NotFound, "watch path not found"),
        other => io::Error::other(format!("{other:?}")),
    }
}

/// Map a notify event onto created/deleted notifications.
fn translate(event: notify::Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(WatchEvent::created).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(WatchEvent::deleted).collect(),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            event.paths.into_iter().map(WatchEvent::modified).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(WatchEvent::deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(WatchEvent::created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                out.push(WatchEvent::deleted(from));
            }
            if let Some(to) = paths.next() {
                out.push(WatchEvent::created(to));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .into_iter()
            .map(|p| {
                if p.exists() {
                    WatchEvent::created(p)
                } else {
                    WatchEvent::deleted(p)
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::WatchEventKind;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (LocalFs, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalFs::new(), dir)
    }

    #[tokio::test]
    async fn test_stat_file_and_dir() {
        let (fs, dir) = setup();
        std::fs::write(dir.path().join("file.txt"), b"content").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let file = fs.stat(&dir.path().join("file.txt")).await.unwrap();
        assert!(file.is_file());
        assert_eq!(file.size, 7);

        let sub = fs.stat(&dir.path().join("sub")).await.unwrap();
        assert!(sub.is_dir());

        let missing = fs.stat(&dir.path().join("missing")).await;
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let (fs, dir) = setup();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let entries = fs.list(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry::file("a.txt"),
                DirEntry::file("b.txt"),
                DirEntry::directory("c"),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_at_range() {
        let (fs, dir) = setup();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        assert_eq!(fs.read_at(&path, 3, 4).await.unwrap(), b"3456");
        assert_eq!(fs.read_at(&path, 8, 10).await.unwrap(), b"89");
    }

    #[tokio::test]
    async fn test_watch_reports_create_and_delete() {
        let (fs, dir) = setup();
        let root = fs.canonicalize(dir.path()).await;
        let mut watcher = fs.watch(&root, true).unwrap();

        let file = root.join("new.txt");
        std::fs::write(&file, b"x").unwrap();

        let created = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match watcher.recv().await {
                    Some(e) if e.path == file && e.kind == WatchEventKind::Created => break e,
                    Some(_) => continue,
                    None => panic!("watcher closed"),
                }
            }
        })
        .await
        .expect("no create event");
        assert_eq!(created.path, file);

        std::fs::remove_file(&file).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match watcher.recv().await {
                    Some(e) if e.path == file && e.kind == WatchEventKind::Deleted => break,
                    Some(_) => continue,
                    None => panic!("watcher closed"),
                }
            }
        })
        .await
        .expect("no delete event");
    }

    #[test]
    fn test_translate_writes_to_modified() {
        let closed = notify::Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(PathBuf::from("/custom/hud.vpk"));
        assert_eq!(translate(closed), vec![WatchEvent::modified("/custom/hud.vpk")]);

        let data = notify::Event::new(EventKind::Modify(ModifyKind::Data(
            notify::event::DataChange::Content,
        )))
        .add_path(PathBuf::from("/custom/hud.vpk"));
        assert_eq!(translate(data), vec![WatchEvent::modified("/custom/hud.vpk")]);

        let opened = notify::Event::new(EventKind::Access(AccessKind::Open(AccessMode::Read)))
            .add_path(PathBuf::from("/custom/hud.vpk"));
        assert!(translate(opened).is_empty());
    }

    #[test]
    fn test_translate_rename_both() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/a/old"))
            .add_path(PathBuf::from("/a/new"));
        assert_eq!(
            translate(event),
            vec![WatchEvent::deleted("/a/old"), WatchEvent::created("/a/new")]
        );
    }

    #[test]
    fn test_translate_ignores_data_changes() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Data(
            notify::event::DataChange::Content,
        )))
        .add_path(PathBuf::from("/a/file"));
        assert!(translate(event).is_empty());
    }
}
