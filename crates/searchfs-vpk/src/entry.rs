//! Entry tree types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{part_path, DIR_ARCHIVE_INDEX};

/// A node in the archive tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VpkEntry {
    File(VpkFile),
    Directory(VpkDirectory),
}

impl VpkEntry {
    pub fn is_file(&self) -> bool {
        matches!(self, VpkEntry::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, VpkEntry::Directory(_))
    }
}

/// Location of one file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkFile {
    /// CRC32 of the full file contents.
    pub crc: u32,
    /// Which part file holds the data, or [`DIR_ARCHIVE_INDEX`].
    pub archive_index: u16,
    /// Absolute offset of the data within its part file.
    ///
    /// For [`DIR_ARCHIVE_INDEX`] entries this already includes the header and
    /// tree size, so it is an offset into the directory file.
    pub offset: u64,
    /// Number of bytes stored in the part file.
    pub length: u32,
    /// Leading bytes stored inline in the tree record.
    pub preload: Vec<u8>,
}

impl VpkFile {
    /// Total size of the file: preload bytes plus archived bytes.
    pub fn size(&self) -> u64 {
        self.preload.len() as u64 + u64::from(self.length)
    }

    /// True if the bytes live inside the directory file.
    pub fn is_embedded(&self) -> bool {
        self.archive_index == DIR_ARCHIVE_INDEX
    }

    /// The file holding this entry's archived bytes, given the directory file.
    pub fn part_path(&self, dir_file: &Path) -> Option<PathBuf> {
        part_path(dir_file, self.archive_index)
    }
}

/// A directory node: children keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpkDirectory {
    children: BTreeMap<String, VpkEntry>,
}

impl VpkDirectory {
    pub fn get(&self, name: &str) -> Option<&VpkEntry> {
        self.children.get(name)
    }

    /// Children in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &VpkEntry)> {
        self.children.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn child_dir_mut(&mut self, name: &str) -> Option<&mut VpkDirectory> {
        let entry = self
            .children
            .entry(name.to_string())
            .or_insert_with(|| VpkEntry::Directory(VpkDirectory::default()));
        match entry {
            VpkEntry::Directory(dir) => Some(dir),
            VpkEntry::File(_) => None,
        }
    }

    pub(crate) fn insert_file(&mut self, name: String, file: VpkFile) {
        self.children.insert(name, VpkEntry::File(file));
    }
}
