//! Configuration for searchfs.
//!
//! Configuration is loaded from `~/.config/searchfs/config.toml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::factory::{MountPointFactory, DEFAULT_WATCH_BUFFER};
use crate::game::{GameFileSystemBuilder, SearchPathManifest, DEFAULT_GAMEINFO_PATH};
use crate::host::HostFs;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFsConfig {
    /// Game installation folder that search paths are relative to.
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    /// Expansion of the `|gameinfo_path|` macro.
    #[serde(default = "default_gameinfo_path")]
    pub gameinfo_path: String,

    /// Capacity of each folder mount's watch event fan-out.
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,

    /// Search-path groups, highest priority first.
    #[serde(default)]
    pub search_paths: Vec<SearchPathConfig>,
}

fn default_gameinfo_path() -> String {
    DEFAULT_GAMEINFO_PATH.to_string()
}

fn default_watch_buffer() -> usize {
    DEFAULT_WATCH_BUFFER
}

impl Default for SearchFsConfig {
    fn default() -> Self {
        Self {
            install_root: None,
            gameinfo_path: default_gameinfo_path(),
            watch_buffer: default_watch_buffer(),
            search_paths: Vec::new(),
        }
    }
}

/// One `[[search_paths]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPathConfig {
    /// Group name, e.g. `game+mod`.
    pub key: String,

    /// One path or a list of paths.
    pub paths: PathList,
}

/// A single path string or an array of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathList {
    One(String),
    Many(Vec<String>),
}

impl PathList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            PathList::One(path) => std::slice::from_ref(path),
            PathList::Many(paths) => paths.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

impl SearchFsConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    #[cfg(feature = "native")]
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default config file path.
    #[cfg(feature = "native")]
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "searchfs")
            .context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// The configured search paths as a manifest, order preserved.
    pub fn manifest(&self) -> SearchPathManifest {
        let mut manifest = SearchPathManifest::new();
        for group in &self.search_paths {
            manifest.push(group.key.clone(), group.paths.iter());
        }
        manifest
    }

    /// A factory over `host` using the configured watch buffer.
    pub fn factory(&self, host: Arc<dyn HostFs>) -> MountPointFactory {
        MountPointFactory::with_watch_buffer(host, self.watch_buffer)
    }

    /// A builder for the configured installation.
    pub fn builder(&self, factory: MountPointFactory) -> Result<GameFileSystemBuilder> {
        let root = self
            .install_root
            .clone()
            .context("install_root is not configured")?;
        Ok(GameFileSystemBuilder::new(factory, root).gameinfo_path(self.gameinfo_path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryFs;

    #[test]
    fn test_default_config() {
        let config = SearchFsConfig::default();
        assert_eq!(config.install_root, None);
        assert_eq!(config.gameinfo_path, "tf/");
        assert_eq!(config.watch_buffer, 256);
        assert!(config.search_paths.is_empty());
        assert!(config.manifest().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
install_root = "/steam/steamapps/common/Team Fortress 2"
gameinfo_path = "tf/"
watch_buffer = 64

[[search_paths]]
key = "game+mod"
paths = "tf/custom/*"

[[search_paths]]
key = "game"
paths = ["|gameinfo_path|tf2_misc.vpk", "|gameinfo_path|."]
"#;

        let config = SearchFsConfig::from_toml_str(toml).expect("parse failed");
        assert_eq!(
            config.install_root,
            Some(PathBuf::from("/steam/steamapps/common/Team Fortress 2"))
        );
        assert_eq!(config.watch_buffer, 64);
        assert_eq!(config.search_paths.len(), 2);
        assert_eq!(config.search_paths[0].paths, PathList::One("tf/custom/*".into()));

        let manifest = config.manifest();
        let paths: Vec<_> = manifest.paths().collect();
        assert_eq!(
            paths,
            vec!["tf/custom/*", "|gameinfo_path|tf2_misc.vpk", "|gameinfo_path|."]
        );
        assert_eq!(manifest.groups()[1].key, "game");
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = SearchFsConfig::from_toml_str("").expect("parse failed");
        assert_eq!(config, SearchFsConfig::default());
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(SearchFsConfig::from_toml_str("watch_buffer = \"lots\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "install_root = \"/games/tf2\"\n").unwrap();

        let config = SearchFsConfig::load_from(&path).unwrap();
        assert_eq!(config.install_root, Some(PathBuf::from("/games/tf2")));

        let missing = SearchFsConfig::load_from(&dir.path().join("nope.toml"));
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_builder_requires_install_root() {
        let factory = SearchFsConfig::default().factory(Arc::new(MemoryFs::new()));
        assert!(SearchFsConfig::default().builder(factory.clone()).is_err());

        let config = SearchFsConfig {
            install_root: Some(PathBuf::from("/games/tf2")),
            gameinfo_path: "hl2/".into(),
            ..SearchFsConfig::default()
        };
        let builder = config.builder(factory).unwrap();
        assert_eq!(builder.expand("|gameinfo_path|maps"), PathBuf::from("/games/tf2/hl2/maps"));
    }
}
