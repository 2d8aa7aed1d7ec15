//! Directory file parsing and lookups.

use std::path::{Path, PathBuf};

use crate::entry::{VpkDirectory, VpkEntry, VpkFile};
use crate::reader::Reader;
use crate::{VpkError, DIR_ARCHIVE_INDEX, RECORD_TERMINATOR, SIGNATURE};

/// Placeholder the format uses for "no directory" and "no extension".
const EMPTY_MARKER: &str = " ";

/// A parsed VPK directory file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpk {
    version: u32,
    tree: VpkEntry,
}

impl Vpk {
    /// Parse a directory file (`*_dir.vpk`).
    ///
    /// Versions 1 and 2 are supported; version 2 adds four section sizes to
    /// the header, which are skipped.
    pub fn parse(data: &[u8]) -> Result<Self, VpkError> {
        let mut r = Reader::new(data);

        let signature = r.u32()?;
        if signature != SIGNATURE {
            return Err(VpkError::InvalidSignature {
                expected: SIGNATURE,
                actual: signature,
            });
        }

        let version = r.u32()?;
        let tree_size = r.u32()?;
        match version {
            1 => {}
            2 => {
                // file data, archive MD5, other MD5, signature section sizes
                r.bytes(16)?;
            }
            other => return Err(VpkError::UnsupportedVersion(other)),
        }

        let data_start = r.position() as u64 + u64::from(tree_size);
        let mut root = VpkDirectory::default();

        loop {
            let extension = r.cstr()?;
            if extension.is_empty() {
                break;
            }

            loop {
                let folder = r.cstr()?;
                if folder.is_empty() {
                    break;
                }

                let dir = descend(&mut root, folder)?;

                loop {
                    let name = r.cstr()?;
                    if name.is_empty() {
                        break;
                    }

                    let file = read_record(&mut r, data_start)?;
                    dir.insert_file(file_name(name, extension), file);
                }
            }
        }

        tracing::trace!(version, tree_size, "parsed VPK directory");

        Ok(Self {
            version,
            tree: VpkEntry::Directory(root),
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The root directory entry.
    pub fn root(&self) -> &VpkEntry {
        &self.tree
    }

    /// Look up a `/`-separated path, case-insensitively.
    ///
    /// The empty path (or `/`) names the root directory. Returns `None` if any
    /// component is missing or a file sits where a directory was expected.
    pub fn entry(&self, path: &str) -> Option<&VpkEntry> {
        let lower = path.to_lowercase();
        let mut current = &self.tree;

        for part in lower.split('/').filter(|p| !p.is_empty()) {
            match current {
                VpkEntry::Directory(dir) => current = dir.get(part)?,
                VpkEntry::File(_) => return None,
            }
        }

        Some(current)
    }

    /// Children of a directory entry; empty for files.
    pub fn entries<'a>(&self, entry: &'a VpkEntry) -> Vec<(&'a str, &'a VpkEntry)> {
        match entry {
            VpkEntry::Directory(dir) => dir.entries().collect(),
            VpkEntry::File(_) => Vec::new(),
        }
    }
}

/// Walk (creating as needed) the directory for a tree folder string.
fn descend<'a>(root: &'a mut VpkDirectory, folder: &str) -> Result<&'a mut VpkDirectory, VpkError> {
    let mut dir = root;
    if folder == EMPTY_MARKER {
        return Ok(dir);
    }

    for part in folder.split('/').filter(|p| !p.is_empty()) {
        dir = dir
            .child_dir_mut(&part.to_lowercase())
            .ok_or_else(|| VpkError::FileInDirectoryPath(folder.to_string()))?;
    }
    Ok(dir)
}

fn read_record(r: &mut Reader<'_>, data_start: u64) -> Result<VpkFile, VpkError> {
    let crc = r.u32()?;
    let preload_len = r.u16()?;
    let archive_index = r.u16()?;
    let offset = r.u32()?;
    let length = r.u32()?;

    let at = r.position();
    let terminator = r.u16()?;
    if terminator != RECORD_TERMINATOR {
        return Err(VpkError::BadTerminator {
            offset: at,
            expected: RECORD_TERMINATOR,
            actual: terminator,
        });
    }

    let preload = r.bytes(usize::from(preload_len))?.to_vec();

    let offset = if archive_index == DIR_ARCHIVE_INDEX {
        data_start + u64::from(offset)
    } else {
        u64::from(offset)
    };

    Ok(VpkFile {
        crc,
        archive_index,
        offset,
        length,
        preload,
    })
}

fn file_name(name: &str, extension: &str) -> String {
    let name = if name == EMPTY_MARKER { "" } else { name };
    let joined = if extension == EMPTY_MARKER {
        name.to_string()
    } else {
        format!("{name}.{extension}")
    };
    joined.to_lowercase()
}

/// Map a directory file and archive index to the file holding the bytes.
///
/// `pak01_dir.vpk` with index 3 maps to `pak01_003.vpk`; index
/// [`DIR_ARCHIVE_INDEX`] maps to the directory file itself. Returns `None`
/// when the directory file does not follow the `_dir.vpk` naming convention.
pub fn part_path(dir_file: &Path, archive_index: u16) -> Option<PathBuf> {
    if archive_index == DIR_ARCHIVE_INDEX {
        return Some(dir_file.to_path_buf());
    }

    let name = dir_file.file_name()?.to_str()?;
    let stem = name.strip_suffix("_dir.vpk")?;
    Some(dir_file.with_file_name(format!("{stem}_{archive_index:03}.vpk")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_rejects_bad_signature() {
        let data = [0u8; 12];
        assert_eq!(
            Vpk::parse(&data),
            Err(VpkError::InvalidSignature {
                expected: SIGNATURE,
                actual: 0
            })
        );
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut data = Vec::new();
        data.extend_from_slice(&SIGNATURE.to_le_bytes());
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(Vpk::parse(&data), Err(VpkError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_empty_tree_parses() {
        let mut data = Vec::new();
        data.extend_from_slice(&SIGNATURE.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(0);

        let vpk = Vpk::parse(&data).unwrap();
        assert_eq!(vpk.version(), 1);
        assert!(vpk.entry("").is_some_and(VpkEntry::is_dir));
        assert!(vpk.entry("materials").is_none());
    }

    #[test]
    fn test_truncated_tree_is_eof() {
        let mut data = Vec::new();
        data.extend_from_slice(&SIGNATURE.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&32u32.to_le_bytes());
        data.extend_from_slice(b"vmt\0materials");
        assert!(matches!(Vpk::parse(&data), Err(VpkError::UnexpectedEof(_))));
    }

    #[rstest]
    #[case("tf/tf2_misc_dir.vpk", 0, Some("tf/tf2_misc_000.vpk"))]
    #[case("tf/tf2_misc_dir.vpk", 12, Some("tf/tf2_misc_012.vpk"))]
    #[case("tf/tf2_misc_dir.vpk", DIR_ARCHIVE_INDEX, Some("tf/tf2_misc_dir.vpk"))]
    #[case("custom/hud.vpk", 0, None)]
    #[case("custom/hud.vpk", DIR_ARCHIVE_INDEX, Some("custom/hud.vpk"))]
    fn test_part_path(#[case] dir: &str, #[case] index: u16, #[case] expected: Option<&str>) {
        assert_eq!(part_path(Path::new(dir), index), expected.map(PathBuf::from));
    }

    #[rstest]
    #[case("foo", "vmt", "foo.vmt")]
    #[case("README", " ", "readme")]
    #[case(" ", "cfg", ".cfg")]
    fn test_file_name(#[case] name: &str, #[case] ext: &str, #[case] expected: &str) {
        assert_eq!(file_name(name, ext), expected);
    }
}
