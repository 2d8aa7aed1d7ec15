//! Resolved locations and path normalization.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Where a resolved file actually lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A file directly readable from the host.
    Host(PathBuf),
    /// An entry inside a VPK archive. `archive` is the `_dir.vpk` file,
    /// `path` the normalized entry path within it.
    Archive { archive: PathBuf, path: String },
}

impl Location {
    pub fn is_archive(&self) -> bool {
        matches!(self, Location::Archive { .. })
    }

    /// The host path, for host locations.
    pub fn host_path(&self) -> Option<&Path> {
        match self {
            Location::Host(p) => Some(p),
            Location::Archive { .. } => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host(p) => write!(f, "{}", p.display()),
            Location::Archive { archive, path } => write!(f, "{}!/{}", archive.display(), path),
        }
    }
}

/// The outcome of resolving one path: `None` means absent.
pub type Resolution = Option<Location>;

/// Lexically normalize a host path: drop `.`, apply `..`, keep the root.
///
/// Used when a path can't be canonicalized (it doesn't exist yet).
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Normalize a mount-relative path into `a/b/c` form.
///
/// Accepts either separator, ignores leading/trailing/repeated separators and
/// `.` segments, and clamps `..` at the mount root. The root itself is `""`.
pub fn normalize_relative(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
