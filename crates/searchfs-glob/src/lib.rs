//! searchfs-glob: glob matching for directory listings.
//!
//! Provides:
//! - **glob_match**: Shell-style matching of a single name (`*`, `?`, `[..]`, `{a,b}`)
//! - **GlobPath**: Path-aware matching where `*` stays inside one segment and
//!   `**` spans any number of segments
//!
//! Patterns are compiled once and matched many times. Mount listings compile
//! the caller's pattern into a `GlobPath` and test every candidate entry name
//! (non-recursive listings) or relative path (recursive listings) against it.

pub mod glob;
mod glob_path;

pub use glob::{contains_glob, expand_braces, glob_match, Segment};
pub use glob_path::{GlobPath, PathSegment};

use thiserror::Error;

/// Errors from compiling a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unclosed character class in pattern: {0}")]
    UnclosedClass(String),
    #[error("invalid range {start}-{end} in pattern: {pattern}")]
    InvalidRange {
        pattern: String,
        start: char,
        end: char,
    },
}
