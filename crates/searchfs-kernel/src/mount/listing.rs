//! Directory listing shared by folder and archive mounts.

use async_trait::async_trait;

use super::ReadDirOptions;
use crate::error::MountError;
use crate::host::DirEntry;

/// Something with a directory tree to list.
#[async_trait]
pub(crate) trait DirSource: Send + Sync {
    /// Entries of `dir` (normalized, `""` is the root).
    ///
    /// `Ok(None)` when the directory does not exist. A source decides for
    /// itself whether a file in its place is `Ok(None)` or an error.
    async fn list_dir(&self, dir: &str) -> Result<Option<Vec<DirEntry>>, MountError>;
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// List `dir` from `source`.
///
/// Dot-prefixed entries are hidden in both modes. Non-recursive: directories
/// always, files if they match the pattern by name. Recursive: files only,
/// named by path relative to `dir`, matched by that relative path;
/// unreadable subdirectories are logged and passed over.
pub(crate) async fn read_listing(
    source: &dyn DirSource,
    dir: &str,
    opts: &ReadDirOptions,
) -> Result<Vec<DirEntry>, MountError> {
    let Some(entries) = source.list_dir(dir).await? else {
        return Ok(Vec::new());
    };

    let matches = |name: &str| opts.pattern.as_ref().is_none_or(|p| p.matches(name));

    if !opts.recursive {
        return Ok(entries
            .into_iter()
            .filter(|e| !is_hidden(&e.name) && (e.is_dir() || matches(&e.name)))
            .collect());
    }

    let mut results = Vec::new();
    // Stack carries: (entries of a directory, its path relative to `dir`)
    let mut stack = vec![(entries, String::new())];

    while let Some((entries, prefix)) = stack.pop() {
        let mut dirs_to_push = Vec::new();

        for entry in entries {
            if is_hidden(&entry.name) {
                continue;
            }

            let relative = join(&prefix, &entry.name);
            if entry.is_dir() {
                dirs_to_push.push(relative);
            } else if matches(&relative) {
                results.push(DirEntry::file(relative));
            }
        }

        // Reverse so alphabetically-first directories are popped first
        for relative in dirs_to_push.into_iter().rev() {
            match source.list_dir(&join(dir, &relative)).await {
                Ok(Some(children)) => stack.push((children, relative)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(dir = %relative, error = %e, "skipping unreadable directory");
                }
            }
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// A fixed tree: directory path → entries.
    struct Tree(HashMap<String, Vec<DirEntry>>);

    #[async_trait]
    impl DirSource for Tree {
        async fn list_dir(&self, dir: &str) -> Result<Option<Vec<DirEntry>>, MountError> {
            Ok(self.0.get(dir).cloned())
        }
    }

    fn tree() -> Tree {
        let mut map = HashMap::new();
        map.insert(
            String::new(),
            vec![
                DirEntry::file("readme.txt"),
                DirEntry::directory("materials"),
                DirEntry::directory(".git"),
                DirEntry::file(".hidden.vmt"),
            ],
        );
        map.insert(
            "materials".to_string(),
            vec![DirEntry::file("a.vmt"), DirEntry::directory("models")],
        );
        map.insert(
            "materials/models".to_string(),
            vec![DirEntry::file("b.vmt"), DirEntry::file("b.vtf")],
        );
        map.insert(".git".to_string(), vec![DirEntry::file("config")]);
        Tree(map)
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_flat_listing_keeps_directories() {
        let opts = ReadDirOptions::default().with_pattern("*.vmt").unwrap();
        let entries = read_listing(&tree(), "", &opts).await.unwrap();
        assert_eq!(names(&entries), vec!["materials"]);
    }

    #[tokio::test]
    async fn test_flat_listing_hides_dot_entries() {
        let entries = read_listing(&tree(), "", &ReadDirOptions::default()).await.unwrap();
        assert_eq!(names(&entries), vec!["readme.txt", "materials"]);
    }

    #[tokio::test]
    async fn test_recursive_lists_files_only() {
        let entries = read_listing(&tree(), "", &ReadDirOptions::recursive()).await.unwrap();
        assert_eq!(
            names(&entries),
            vec!["readme.txt", "materials/a.vmt", "materials/models/b.vmt", "materials/models/b.vtf"]
        );
        assert!(entries.iter().all(DirEntry::is_file));
    }

    #[tokio::test]
    async fn test_recursive_pattern_reaches_nested_matches() {
        let opts = ReadDirOptions::recursive().with_pattern("**/*.vmt").unwrap();
        let entries = read_listing(&tree(), "", &opts).await.unwrap();
        assert_eq!(names(&entries), vec!["materials/a.vmt", "materials/models/b.vmt"]);
    }

    #[tokio::test]
    async fn test_recursive_relative_to_queried_dir() {
        let opts = ReadDirOptions::recursive().with_pattern("models/*").unwrap();
        let entries = read_listing(&tree(), "materials", &opts).await.unwrap();
        assert_eq!(names(&entries), vec!["models/b.vmt", "models/b.vtf"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let entries = read_listing(&tree(), "sound", &ReadDirOptions::default()).await.unwrap();
        assert!(entries.is_empty());
    }
}
