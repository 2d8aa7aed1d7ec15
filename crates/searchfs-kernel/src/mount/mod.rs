//! Mounts: resolvable backing stores.
//!
//! Every mount answers the same three questions:
//!
//! - `resolve_file(path)`: a [`LiveFile`] tracking where `path` lives
//! - `read_directory(path, opts)`: a one-shot listing, deduplicated by name
//! - `dispose()`: release watchers and child mounts
//!
//! Paths are mount-relative and `/`-separated; they are normalized on entry,
//! so `materials\foo.vmt`, `/materials/foo.vmt` and `materials/./foo.vmt`
//! are the same path.

mod archive;
mod children;
mod composite;
mod folder;
mod listing;
mod merge;
mod wildcard;

pub use archive::ArchiveMount;
pub use children::{Named, SortedChildren};
pub use composite::CompositeMount;
pub use folder::FolderMount;
pub use wildcard::WildcardMount;
pub(crate) use wildcard::wildcard_parent;

use std::fmt;

use futures::future::BoxFuture;
use searchfs_glob::{GlobPath, PatternError};

use crate::error::MountError;
use crate::factory::MountHandle;
use crate::host::DirEntry;
use crate::live::LiveFile;

/// The four mount strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    Folder,
    Archive,
    Wildcard,
    Composite,
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MountKind::Folder => "folder",
            MountKind::Archive => "archive",
            MountKind::Wildcard => "wildcard",
            MountKind::Composite => "composite",
        };
        f.write_str(name)
    }
}

/// Options for [`Mount::read_directory`].
#[derive(Debug, Clone, Default)]
pub struct ReadDirOptions {
    /// Walk subdirectories and return files by relative path.
    pub recursive: bool,
    /// Only return files whose name (or relative path, when recursive)
    /// matches.
    pub pattern: Option<GlobPath>,
}

impl ReadDirOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, PatternError> {
        self.pattern = Some(GlobPath::new(pattern)?);
        Ok(self)
    }
}

/// A resolvable backing store.
#[derive(Debug)]
pub enum Mount {
    Folder(FolderMount),
    Archive(ArchiveMount),
    Wildcard(WildcardMount),
    Composite(CompositeMount),
    /// A factory-issued lease on a shared mount.
    Shared(MountHandle),
}

impl Mount {
    /// The strategy behind this mount, looking through shared handles.
    pub fn kind(&self) -> MountKind {
        match self {
            Mount::Folder(_) => MountKind::Folder,
            Mount::Archive(_) => MountKind::Archive,
            Mount::Wildcard(_) => MountKind::Wildcard,
            Mount::Composite(_) => MountKind::Composite,
            Mount::Shared(handle) => handle.mount().kind(),
        }
    }

    /// Track where `path` lives in this mount.
    ///
    /// Never blocks: the returned cell fills in asynchronously. Must be
    /// called from within a Tokio runtime.
    pub fn resolve_file(&self, path: &str) -> LiveFile {
        match self {
            Mount::Folder(m) => m.resolve_file(path),
            Mount::Archive(m) => m.resolve_file(path),
            Mount::Wildcard(m) => m.resolve_file(path),
            Mount::Composite(m) => m.resolve_file(path),
            Mount::Shared(handle) => handle.mount().resolve_file(path),
        }
    }

    /// List a directory.
    ///
    /// Boxed because composites and wildcards list their children
    /// recursively through this same method.
    pub fn read_directory<'a>(
        &'a self,
        path: &'a str,
        opts: &'a ReadDirOptions,
    ) -> BoxFuture<'a, Result<Vec<DirEntry>, MountError>> {
        match self {
            Mount::Folder(m) => Box::pin(m.read_directory(path, opts)),
            Mount::Archive(m) => Box::pin(m.read_directory(path, opts)),
            Mount::Wildcard(m) => Box::pin(m.read_directory(path, opts)),
            Mount::Composite(m) => Box::pin(m.read_directory(path, opts)),
            Mount::Shared(handle) => handle.mount().read_directory(path, opts),
        }
    }

    /// Release resources. For a shared handle this releases the lease; the
    /// factory disposes the underlying mount with its last lease.
    pub fn dispose(&self) {
        match self {
            Mount::Folder(m) => m.dispose(),
            Mount::Archive(m) => m.dispose(),
            Mount::Wildcard(m) => m.dispose(),
            Mount::Composite(m) => m.dispose(),
            Mount::Shared(handle) => handle.dispose(),
        }
    }
}

impl From<MountHandle> for Mount {
    fn from(handle: MountHandle) -> Self {
        Mount::Shared(handle)
    }
}
