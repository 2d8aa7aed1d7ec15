//! Mount construction and listing errors.

use std::io;
use std::path::{Path, PathBuf};

use searchfs_vpk::VpkError;

/// Why a mount could not be built or a directory could not be listed.
///
/// `Clone` so one failed in-flight build can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MountError {
    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("is a directory: {0}")]
    IsADirectory(PathBuf),

    #[error("wildcard path must end in '*': {0}")]
    NotAWildcard(PathBuf),

    #[error("bad archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: VpkError,
    },

    #[error("{path}: {message}")]
    Io {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },
}

impl MountError {
    /// Map a host I/O error onto the structural cases, keeping the rest as `Io`.
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        let path = path.to_path_buf();
        match error.kind() {
            io::ErrorKind::NotFound => MountError::NotFound(path),
            io::ErrorKind::NotADirectory => MountError::NotADirectory(path),
            io::ErrorKind::IsADirectory => MountError::IsADirectory(path),
            kind => MountError::Io {
                path,
                kind,
                message: error.to_string(),
            },
        }
    }

    /// True for the expected "nothing there" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MountError::NotFound(_))
    }
}

impl From<MountError> for io::Error {
    fn from(error: MountError) -> Self {
        let kind = match &error {
            MountError::NotFound(_) => io::ErrorKind::NotFound,
            MountError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            MountError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            MountError::NotAWildcard(_) => io::ErrorKind::InvalidInput,
            MountError::Archive { .. } => io::ErrorKind::InvalidData,
            MountError::Io { kind, .. } => *kind,
        };
        io::Error::new(kind, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_structural_kinds() {
        let p = Path::new("/x");
        assert!(MountError::from_io(p, io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(matches!(
            MountError::from_io(p, io::Error::from(io::ErrorKind::NotADirectory)),
            MountError::NotADirectory(_)
        ));
        assert!(matches!(
            MountError::from_io(p, io::Error::from(io::ErrorKind::PermissionDenied)),
            MountError::Io {
                kind: io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }

    #[test]
    fn test_into_io_keeps_kind() {
        let err: io::Error = MountError::IsADirectory(PathBuf::from("/d")).into();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }
}
