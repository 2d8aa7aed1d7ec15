//! Game search paths.
//!
//! A search-path manifest is an ordered list of path tokens, grouped by key
//! the way `gameinfo.txt` groups them. The builder expands the macros in each
//! token, classifies the result as a folder, archive or wildcard, mounts
//! every candidate through the factory, and composes the survivors in
//! manifest order.

use std::path::{Path, PathBuf};

use futures::future::join_all;

use crate::error::MountError;
use crate::factory::{MountHandle, MountPointFactory};
use crate::host::DirEntry;
use crate::live::LiveFile;
use crate::location::Location;
use crate::mount::{wildcard_parent, CompositeMount, Mount, MountKind, ReadDirOptions};

/// Macro standing for the engine's base paths; expands to nothing.
pub const ALL_SOURCE_ENGINE_PATHS: &str = "|all_source_engine_paths|";

/// Macro standing for the directory holding `gameinfo.txt`.
pub const GAMEINFO_PATH: &str = "|gameinfo_path|";

/// Default expansion of [`GAMEINFO_PATH`].
pub const DEFAULT_GAMEINFO_PATH: &str = "tf/";

/// One keyed group of manifest lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPathGroup {
    pub key: String,
    pub paths: Vec<String>,
}

/// Ordered search-path tokens. Earlier tokens have priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPathManifest {
    groups: Vec<SearchPathGroup>,
}

impl SearchPathManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group.
    pub fn with<I, S>(mut self, key: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(key, paths);
        self
    }

    pub fn push<I, S>(&mut self, key: impl Into<String>, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.push(SearchPathGroup {
            key: key.into(),
            paths: paths.into_iter().map(Into::into).collect(),
        });
    }

    pub fn groups(&self) -> &[SearchPathGroup] {
        &self.groups
    }

    /// Every token, in priority order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|group| group.paths.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.paths().next().is_none()
    }
}

/// A manifest token after expansion, classified by shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchPathEntry {
    /// A plain directory.
    Folder(PathBuf),
    /// A VPK archive, named by its `_dir.vpk` file.
    Archive(PathBuf),
    /// A directory whose children are each mounted; the path ends in `*`.
    Wildcard(PathBuf),
}

impl SearchPathEntry {
    /// Classify a path: trailing `*` is a wildcard, a `.vpk` file is an
    /// archive (`name.vpk` meaning `name_dir.vpk`), anything else a folder.
    pub fn classify(path: PathBuf) -> Self {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return SearchPathEntry::Folder(path);
        };

        if name == "*" {
            return SearchPathEntry::Wildcard(path);
        }

        let lower = name.to_ascii_lowercase();
        if lower.ends_with("_dir.vpk") {
            return SearchPathEntry::Archive(path);
        }
        if lower.ends_with(".vpk") {
            let stem = &name[..name.len() - ".vpk".len()];
            let dir_file = path.with_file_name(format!("{stem}_dir.vpk"));
            return SearchPathEntry::Archive(dir_file);
        }

        SearchPathEntry::Folder(path)
    }

    pub fn kind(&self) -> MountKind {
        match self {
            SearchPathEntry::Folder(_) => MountKind::Folder,
            SearchPathEntry::Archive(_) => MountKind::Archive,
            SearchPathEntry::Wildcard(_) => MountKind::Wildcard,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SearchPathEntry::Folder(p) | SearchPathEntry::Archive(p) | SearchPathEntry::Wildcard(p) => p,
        }
    }

    async fn mount(&self, factory: &MountPointFactory) -> Result<MountHandle, MountError> {
        match self {
            SearchPathEntry::Folder(p) => factory.folder(p).await,
            SearchPathEntry::Archive(p) => factory.archive(p).await,
            SearchPathEntry::Wildcard(p) => factory.wildcard(p).await,
        }
    }
}

/// Builds a [`GameFileSystem`] from a manifest.
#[derive(Debug, Clone)]
pub struct GameFileSystemBuilder {
    factory: MountPointFactory,
    install_root: PathBuf,
    gameinfo_path: String,
}

impl GameFileSystemBuilder {
    /// Manifest tokens are resolved relative to `install_root`.
    pub fn new(factory: MountPointFactory, install_root: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            install_root: install_root.into(),
            gameinfo_path: DEFAULT_GAMEINFO_PATH.to_string(),
        }
    }

    /// Override the expansion of [`GAMEINFO_PATH`].
    pub fn gameinfo_path(mut self, path: impl Into<String>) -> Self {
        self.gameinfo_path = path.into();
        self
    }

    /// Expand the macros in one token and anchor it at the install root.
    pub fn expand(&self, token: &str) -> PathBuf {
        let relative = token
            .replace(ALL_SOURCE_ENGINE_PATHS, "")
            .replace(GAMEINFO_PATH, &self.gameinfo_path);
        self.install_root.join(relative.trim())
    }

    /// Expanded and classified candidates, first occurrence of each
    /// physical location kept.
    pub async fn candidates(&self, manifest: &SearchPathManifest) -> Vec<SearchPathEntry> {
        let host = self.factory.host();
        let mut seen = Vec::new();
        let mut candidates = Vec::new();

        for token in manifest.paths() {
            let entry = SearchPathEntry::classify(self.expand(token));
            let identity = match &entry {
                SearchPathEntry::Wildcard(p) => match wildcard_parent(p) {
                    Some(parent) => host.canonicalize(&parent).await.join("*"),
                    None => p.clone(),
                },
                other => host.canonicalize(other.path()).await,
            };

            if seen.contains(&identity) {
                tracing::debug!(token, path = %identity.display(), "duplicate search path");
                continue;
            }
            seen.push(identity);
            candidates.push(entry);
        }
        candidates
    }

    /// Mount every candidate and compose the ones that succeed.
    ///
    /// Candidates are built concurrently and independently: a missing path
    /// is dropped quietly, any other failure is logged and dropped.
    pub async fn build(&self, manifest: &SearchPathManifest) -> GameFileSystem {
        let candidates = self.candidates(manifest).await;
        let results = join_all(candidates.iter().map(|entry| entry.mount(&self.factory))).await;

        let mut mounted = Vec::new();
        let mut children = Vec::new();
        for (entry, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(handle) => {
                    children.push(Mount::Shared(handle));
                    mounted.push(entry);
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(path = %entry.path().display(), "search path not present");
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "dropping search path");
                }
            }
        }

        if children.is_empty() {
            tracing::warn!(root = %self.install_root.display(), "no search paths could be mounted");
        } else {
            tracing::debug!(root = %self.install_root.display(), mounts = children.len(), "game file system ready");
        }

        GameFileSystem {
            root: Mount::Composite(CompositeMount::new(children)),
            search_paths: mounted,
            factory: self.factory.clone(),
        }
    }
}

/// The composed search path of one game installation.
#[derive(Debug)]
pub struct GameFileSystem {
    root: Mount,
    search_paths: Vec<SearchPathEntry>,
    factory: MountPointFactory,
}

impl GameFileSystem {
    /// The top-level composite mount.
    pub fn mount(&self) -> &Mount {
        &self.root
    }

    /// The search paths that were mounted, in priority order.
    pub fn search_paths(&self) -> &[SearchPathEntry] {
        &self.search_paths
    }

    pub fn resolve_file(&self, path: &str) -> LiveFile {
        self.root.resolve_file(path)
    }

    pub async fn read_directory(
        &self,
        path: &str,
        opts: &ReadDirOptions,
    ) -> Result<Vec<DirEntry>, MountError> {
        self.root.read_directory(path, opts).await
    }

    /// Read the bytes behind a resolved location.
    ///
    /// Archive locations go back through the factory, so a live archive
    /// mount is reused rather than reparsed.
    pub async fn read(&self, location: &Location) -> Result<Vec<u8>, MountError> {
        match location {
            Location::Host(path) => self
                .factory
                .host()
                .read(path)
                .await
                .map_err(|e| MountError::from_io(path, e)),
            Location::Archive { archive, path } => {
                let handle = self.factory.archive(archive).await?;
                let Mount::Archive(mount) = handle.mount() else {
                    return Err(MountError::Io {
                        path: archive.clone(),
                        kind: std::io::ErrorKind::InvalidData,
                        message: format!("expected an archive mount, got {}", handle.mount().kind()),
                    });
                };
                mount.read_file(path).await
            }
        }
    }

    /// Release every search-path mount.
    pub fn dispose(&self) {
        self.root.dispose();
    }
}
