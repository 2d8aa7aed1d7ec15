//! Composite mounts: a fixed, ordered list of mounts, first match wins.

use std::fmt;
use std::sync::Arc;

use super::merge::{merge_into, union_listings};
use super::{Mount, ReadDirOptions};
use crate::error::MountError;
use crate::host::DirEntry;
use crate::live::{LiveFile, PathTable};
use crate::location::normalize_relative;

/// Merges child mounts in list order.
///
/// Membership is fixed at construction. Whether children are shared
/// factory handles or exclusive mounts is up to whoever built the list;
/// `dispose` simply disposes each one.
#[derive(Clone)]
pub struct CompositeMount {
    inner: Arc<CompositeInner>,
}

struct CompositeInner {
    children: Vec<Arc<Mount>>,
    paths: PathTable,
}

impl fmt::Debug for CompositeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeMount")
            .field("children", &self.inner.children.len())
            .field("live_paths", &self.inner.paths.len())
            .finish()
    }
}

impl CompositeMount {
    /// Compose `children`; earlier entries have priority.
    pub fn new(children: Vec<Mount>) -> Self {
        Self {
            inner: Arc::new(CompositeInner {
                children: children.into_iter().map(Arc::new).collect(),
                paths: PathTable::default(),
            }),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Mount> {
        self.inner.children.iter().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.inner.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.children.is_empty()
    }

    pub fn resolve_file(&self, path: &str) -> LiveFile {
        let rel = normalize_relative(path);
        let inner = self.inner.clone();
        self.inner.paths.subscribe(rel.clone(), move |tx| {
            let mut inputs: Vec<LiveFile> =
                inner.children.iter().map(|child| child.resolve_file(&rel)).collect();
            async move {
                merge_into(&tx, &mut inputs).await;
            }
        })
    }

    pub async fn read_directory(
        &self,
        path: &str,
        opts: &ReadDirOptions,
    ) -> Result<Vec<DirEntry>, MountError> {
        Ok(union_listings(&self.inner.children, path, opts).await)
    }

    pub fn dispose(&self) {
        for child in &self.inner.children {
            child.dispose();
        }
    }
}
