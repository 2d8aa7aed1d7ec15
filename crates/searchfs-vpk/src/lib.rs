//! searchfs-vpk: read-only index over Valve VPK archives.
//!
//! A VPK archive is a `name_dir.vpk` directory file plus numbered part files
//! (`name_000.vpk`, `name_001.vpk`, ...). The directory file holds a tree of
//! entries; each file entry names the part it lives in and the byte range
//! within that part. Entries with archive index [`DIR_ARCHIVE_INDEX`] store
//! their bytes inside the directory file itself, after the tree.
//!
//! This crate parses the directory file into a [`Vpk`] and answers lookups.
//! Reading the bytes is left to the caller, who knows how to reach the part
//! files (see [`VpkFile::part_path`]).
//!
//! Format reference: <https://developer.valvesoftware.com/wiki/VPK_File_Format>

mod archive;
mod entry;
mod reader;

pub use archive::{part_path, Vpk};
pub use entry::{VpkDirectory, VpkEntry, VpkFile};

use thiserror::Error;

/// Magic number at the start of every VPK directory file.
pub const SIGNATURE: u32 = 0x55AA_1234;

/// Archive index meaning "stored in the directory file itself".
pub const DIR_ARCHIVE_INDEX: u16 = 0x7FFF;

/// Marker closing each file record in the tree.
pub const RECORD_TERMINATOR: u16 = 0xFFFF;

/// Errors from parsing a VPK directory file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VpkError {
    #[error("invalid VPK signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },
    #[error("unsupported VPK version {0}")]
    UnsupportedVersion(u32),
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(usize),
    #[error("unexpected record terminator at offset {offset}: expected {expected:#06x}, got {actual:#06x}")]
    BadTerminator {
        offset: usize,
        expected: u16,
        actual: u16,
    },
    #[error("found file entry while creating directory {0:?}")]
    FileInDirectoryPath(String),
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidString(usize),
}
