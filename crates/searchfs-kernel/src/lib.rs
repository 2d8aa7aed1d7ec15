//! searchfs-kernel: live search-path file resolution.
//!
//! This crate provides:
//!
//! - **Hosts**: the [`HostFs`] capability over real disk ([`LocalFs`]) or
//!   memory ([`MemoryFs`])
//! - **Mounts**: folder, VPK archive, wildcard and composite strategies
//!   behind one [`Mount`] type
//! - **Live cells**: [`LiveFile`], a push-updating view of where a path
//!   currently resolves
//! - **Factory**: [`MountPointFactory`], a reference-counted cache so each
//!   physical folder or archive is opened once
//! - **Game search paths**: [`GameFileSystemBuilder`] turns a manifest of
//!   path tokens into one composite, first match wins
//!
//! ```no_run
//! use std::sync::Arc;
//! use searchfs_kernel::{GameFileSystemBuilder, LocalFs, MountPointFactory, SearchPathManifest};
//!
//! # async fn demo() {
//! let factory = MountPointFactory::new(Arc::new(LocalFs::new()));
//! let manifest = SearchPathManifest::new()
//!     .with("game+mod", ["tf/custom/*"])
//!     .with("game", ["|gameinfo_path|tf2_misc.vpk", "|gameinfo_path|."]);
//!
//! let game = GameFileSystemBuilder::new(factory, "/games/Team Fortress 2")
//!     .build(&manifest)
//!     .await;
//!
//! let mut live = game.resolve_file("materials/console/background_upward.vmt");
//! if let Some(location) = live.resolved().await {
//!     let _bytes = game.read(&location).await;
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod game;
pub mod host;
pub mod live;
pub mod location;
pub mod mount;

pub use config::SearchFsConfig;
pub use error::MountError;
pub use factory::{FactoryStats, MountHandle, MountPointFactory};
pub use game::{GameFileSystem, GameFileSystemBuilder, SearchPathEntry, SearchPathManifest};
#[cfg(feature = "native")]
pub use host::LocalFs;
pub use host::{DirEntry, EntryKind, HostFs, MemoryFs};
pub use live::LiveFile;
pub use location::{Location, Resolution};
pub use mount::{Mount, MountKind, ReadDirOptions};
