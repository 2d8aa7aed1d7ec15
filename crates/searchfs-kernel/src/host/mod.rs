//! Host filesystems the mounts read from.
//!
//! `LocalFs` is the real disk (behind the `native` feature); `MemoryFs` is an
//! in-memory tree with synthetic watch events, used by tests.

#[cfg(feature = "native")]
mod local;
mod memory;
mod traits;

#[cfg(feature = "native")]
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use traits::{
    DirEntry, EntryKind, HostFs, HostWatcher, Metadata, WatchEvent, WatchEventKind,
};
