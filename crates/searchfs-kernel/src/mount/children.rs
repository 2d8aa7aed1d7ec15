//! Name-ordered child container for wildcard mounts.

use std::sync::Arc;

use super::Mount;

/// A value tagged with the directory entry name it came from.
#[derive(Debug, Clone)]
pub struct Named<T> {
    pub name: String,
    pub value: T,
}

/// Children kept in case-sensitive name order, at most one per name.
///
/// Insertion uses binary search, so the ordering holds after every
/// mutation rather than being restored by a later sort.
#[derive(Debug, Clone)]
pub struct SortedChildren<T = Arc<Mount>> {
    items: Vec<Named<T>>,
}

impl<T> Default for SortedChildren<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> SortedChildren<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self, name: &str) -> Result<usize, usize> {
        self.items.binary_search_by(|item| item.name.as_str().cmp(name))
    }

    /// Insert a child. Returns it back if the name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<(), Named<T>> {
        let name = name.into();
        match self.search(&name) {
            Ok(_) => Err(Named { name, value }),
            Err(at) => {
                self.items.insert(at, Named { name, value });
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Named<T>> {
        self.search(name).ok().map(|at| self.items.remove(at))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.search(name).is_ok()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.search(name).ok().map(|at| &self.items[at].value)
    }

    /// Remove every child, in order.
    pub fn drain(&mut self) -> impl Iterator<Item = Named<T>> + '_ {
        self.items.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Named<T>> {
        self.items.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
