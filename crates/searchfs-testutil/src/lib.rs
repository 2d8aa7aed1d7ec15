//! Test utilities for searchfs.
//!
//! - [`VpkBuilder`] writes small VPK archives for fixtures
//! - [`init_tracing`] installs a `RUST_LOG`-driven subscriber once
//! - [`within`] and [`eventually`] bound waits on live cells and watchers

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use searchfs_vpk::{DIR_ARCHIVE_INDEX, RECORD_TERMINATOR, SIGNATURE};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long helpers wait before declaring a test hung.
pub const WAIT: Duration = Duration::from_secs(5);

/// Initialize tracing for tests (respects `RUST_LOG`). Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Await `future`, panicking if it takes longer than [`WAIT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(WAIT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out after {WAIT:?}"),
    }
}

/// Poll `check` until it returns true, panicking after [`WAIT`].
pub async fn eventually(mut check: impl FnMut() -> bool) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Placeholder the format uses for "no directory" and "no extension".
const EMPTY: &str = " ";

/// Writes VPK directory files (and part files) from in-memory contents.
///
/// ```
/// let bytes = searchfs_testutil::VpkBuilder::new()
///     .file("materials/x.vmt", b"\"LightmappedGeneric\" {}")
///     .build();
/// assert!(searchfs_vpk::Vpk::parse(&bytes).is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct VpkBuilder {
    version: u32,
    preload_len: usize,
    files: Vec<(String, Vec<u8>)>,
}

impl Default for VpkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tree grouping: extension → directory → (name, data).
type Tree<'a> = BTreeMap<&'a str, BTreeMap<&'a str, Vec<(&'a str, &'a [u8])>>>;

impl VpkBuilder {
    pub fn new() -> Self {
        Self {
            version: 1,
            preload_len: 0,
            files: Vec::new(),
        }
    }

    /// Header version to write (1 or 2).
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Store up to `len` leading bytes of each file inline in the tree.
    pub fn preload_len(mut self, len: usize) -> Self {
        self.preload_len = len;
        self
    }

    pub fn file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        self.files.push((path.to_string(), data.as_ref().to_vec()));
        self
    }

    /// A single directory file with all data embedded after the tree.
    pub fn build(&self) -> Vec<u8> {
        let (tree, data) = self.tree(DIR_ARCHIVE_INDEX);
        let mut out = self.header(tree.len(), data.len());
        out.extend_from_slice(&tree);
        out.extend_from_slice(&data);
        out
    }

    /// A directory file plus one part file (`_000`) holding the data.
    pub fn build_split(&self) -> (Vec<u8>, Vec<Vec<u8>>) {
        let (tree, data) = self.tree(0);
        let mut dir = self.header(tree.len(), 0);
        dir.extend_from_slice(&tree);
        (dir, vec![data])
    }

    fn header(&self, tree_size: usize, data_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(tree_size as u32).to_le_bytes());
        if self.version == 2 {
            out.extend_from_slice(&(data_size as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        out
    }

    fn tree(&self, archive_index: u16) -> (Vec<u8>, Vec<u8>) {
        let mut grouped: Tree<'_> = BTreeMap::new();
        for (path, data) in &self.files {
            let (dir, file) = path.rsplit_once('/').unwrap_or((EMPTY, path));
            let (name, ext) = file.rsplit_once('.').unwrap_or((file, EMPTY));
            let name = if name.is_empty() { EMPTY } else { name };
            grouped
                .entry(ext)
                .or_default()
                .entry(dir)
                .or_default()
                .push((name, data));
        }

        let mut tree = Vec::new();
        let mut blob = Vec::new();
        for (ext, dirs) in &grouped {
            push_cstr(&mut tree, ext);
            for (dir, files) in dirs {
                push_cstr(&mut tree, dir);
                for (name, data) in files {
                    push_cstr(&mut tree, name);

                    let split = self.preload_len.min(data.len());
                    let (preload, rest) = data.split_at(split);
                    tree.extend_from_slice(&0u32.to_le_bytes()); // crc, unchecked
                    tree.extend_from_slice(&(preload.len() as u16).to_le_bytes());
                    tree.extend_from_slice(&archive_index.to_le_bytes());
                    tree.extend_from_slice(&(blob.len() as u32).to_le_bytes());
                    tree.extend_from_slice(&(rest.len() as u32).to_le_bytes());
                    tree.extend_from_slice(&RECORD_TERMINATOR.to_le_bytes());
                    tree.extend_from_slice(preload);
                    blob.extend_from_slice(rest);
                }
                tree.push(0);
            }
            tree.push(0);
        }
        tree.push(0);

        (tree, blob)
    }
}

fn push_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchfs_vpk::{Vpk, VpkEntry};

    #[test]
    fn test_builder_round_trips_through_parser() {
        let bytes = VpkBuilder::new()
            .file("materials/x.vmt", b"vmt")
            .file("README", b"readme")
            .build();
        let vpk = Vpk::parse(&bytes).unwrap();

        let Some(VpkEntry::File(file)) = vpk.entry("materials/x.vmt") else {
            panic!("missing materials/x.vmt");
        };
        assert!(file.is_embedded());
        assert_eq!(file.size(), 3);
        assert!(vpk.entry("readme").is_some_and(VpkEntry::is_file));
    }

    #[test]
    fn test_version_two_header() {
        let bytes = VpkBuilder::new().version(2).file("a/b.txt", b"x").build();
        let vpk = Vpk::parse(&bytes).unwrap();
        assert_eq!(vpk.version(), 2);
        assert!(vpk.entry("a/b.txt").is_some());
    }
}
