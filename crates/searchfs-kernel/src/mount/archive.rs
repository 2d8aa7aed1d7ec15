//! Archive mounts: one VPK directory file, read once.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use searchfs_vpk::{Vpk, VpkEntry};

use super::listing::{read_listing, DirSource};
use super::ReadDirOptions;
use crate::error::MountError;
use crate::host::{DirEntry, HostFs};
use crate::live::LiveFile;
use crate::location::{normalize_relative, Location, Resolution};

/// Resolves paths against a parsed VPK directory.
///
/// Archives are treated as immutable for the life of the mount, so there is
/// no watcher and every resolution is final.
#[derive(Clone)]
pub struct ArchiveMount {
    inner: Arc<ArchiveInner>,
}

struct ArchiveInner {
    path: PathBuf,
    host: Arc<dyn HostFs>,
    index: Vpk,
}

impl fmt::Debug for ArchiveMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveMount")
            .field("path", &self.inner.path)
            .field("version", &self.inner.index.version())
            .finish()
    }
}

impl ArchiveMount {
    /// Open and index the directory file at `path`, which must be a file.
    pub async fn new(host: Arc<dyn HostFs>, path: &Path) -> Result<Self, MountError> {
        let meta = host
            .stat(path)
            .await
            .map_err(|e| MountError::from_io(path, e))?;
        if meta.is_dir() {
            return Err(MountError::IsADirectory(path.to_path_buf()));
        }

        let path = host.canonicalize(path).await;
        let data = host
            .read(&path)
            .await
            .map_err(|e| MountError::from_io(&path, e))?;
        let index = Vpk::parse(&data).map_err(|source| MountError::Archive {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(archive = %path.display(), version = index.version(), "archive mounted");

        Ok(Self {
            inner: Arc::new(ArchiveInner { path, host, index }),
        })
    }

    /// The canonical directory file path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn resolve_file(&self, path: &str) -> LiveFile {
        LiveFile::fixed(self.lookup(path))
    }

    fn lookup(&self, path: &str) -> Resolution {
        let rel = normalize_relative(path).to_lowercase();
        match self.inner.index.entry(&rel) {
            Some(VpkEntry::File(_)) => Some(Location::Archive {
                archive: self.inner.path.clone(),
                path: rel,
            }),
            Some(VpkEntry::Directory(_)) => {
                tracing::warn!(
                    archive = %self.inner.path.display(),
                    path = %rel,
                    "directory found where a file was expected"
                );
                None
            }
            None => None,
        }
    }

    /// Read an entry's bytes: its preload followed by its archived range.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, MountError> {
        let rel = normalize_relative(path).to_lowercase();
        let missing = || self.inner.path.join(&rel);

        let file = match self.inner.index.entry(&rel) {
            Some(VpkEntry::File(file)) => file,
            Some(VpkEntry::Directory(_)) => return Err(MountError::IsADirectory(missing())),
            None => return Err(MountError::NotFound(missing())),
        };

        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        data.extend_from_slice(&file.preload);

        if file.length > 0 {
            let part = file.part_path(&self.inner.path).ok_or_else(|| MountError::Io {
                path: self.inner.path.clone(),
                kind: std::io::ErrorKind::InvalidData,
                message: format!(
                    "entry {rel} lives in part {} but the archive is not a _dir.vpk",
                    file.archive_index
                ),
            })?;
            let bytes = self
                .inner
                .host
                .read_at(&part, file.offset, file.length as usize)
                .await
                .map_err(|e| MountError::from_io(&part, e))?;
            data.extend_from_slice(&bytes);
        }

        Ok(data)
    }

    pub async fn read_directory(
        &self,
        path: &str,
        opts: &ReadDirOptions,
    ) -> Result<Vec<DirEntry>, MountError> {
        read_listing(self.inner.as_ref(), &normalize_relative(path), opts).await
    }

    pub fn dispose(&self) {
        tracing::debug!(archive = %self.inner.path.display(), "archive disposed");
    }
}

#[async_trait]
impl DirSource for ArchiveInner {
    async fn list_dir(&self, dir: &str) -> Result<Option<Vec<DirEntry>>, MountError> {
        match self.index.entry(dir) {
            Some(entry @ VpkEntry::Directory(_)) => Ok(Some(
                self.index
                    .entries(entry)
                    .into_iter()
                    .map(|(name, child)| match child {
                        VpkEntry::File(_) => DirEntry::file(name),
                        VpkEntry::Directory(_) => DirEntry::directory(name),
                    })
                    .collect(),
            )),
            Some(VpkEntry::File(_)) => Err(MountError::NotADirectory(self.path.join(dir))),
            None => Ok(None),
        }
    }
}
