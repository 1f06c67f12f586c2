//! Pluggable tile data sources.

use crate::{srtm, SourceError};
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf};
use tilegrid::TileId;

/// Contract every elevation data source satisfies.
///
/// `get_tile` must be idempotent and cache-aware: a locally cached
/// tile is returned without any network access, and a tile absent
/// from the source's existence index fails fast with
/// [`SourceError::NotFound`].
pub trait TileSource: Send + Sync {
    /// Short lowercase identifier, also the cache subdirectory stem.
    fn nickname(&self) -> &'static str;

    /// Native extension of downloaded tile files.
    fn file_extension(&self) -> &'static str;

    /// Resolutions (arc-seconds per sample) this source provides.
    fn supported_resolutions(&self) -> &'static [u8];

    /// Attribution line to show when the source is used.
    fn banner(&self) -> &'static str;

    /// Returns the local path of `tile`, downloading it if necessary.
    fn get_tile(&self, tile: &TileId, resolution: u8) -> Result<PathBuf, SourceError>;
}

/// Source construction settings, built once at process start.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Root directory for downloaded tiles.
    pub cache_dir: PathBuf,

    /// Directory holding persistent existence indexes.
    pub config_dir: PathBuf,

    pub srtm: Option<srtm::SrtmConfig>,
}

type Constructor = fn(&SourceConfig) -> Result<Box<dyn TileSource>, SourceError>;

/// Static nickname → constructor mapping, built at process start.
pub struct Registry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Registry {
    /// Registry holding the built-in sources.
    pub fn builtin() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register(srtm::NICKNAME, srtm::Srtm::boxed);
        registry
    }

    pub fn register(&mut self, nickname: &'static str, constructor: Constructor) {
        self.constructors.insert(nickname, constructor);
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.constructors.contains_key(nickname)
    }

    pub fn construct(
        &self,
        nickname: &str,
        config: &SourceConfig,
    ) -> Result<Box<dyn TileSource>, SourceError> {
        let constructor = self
            .constructors
            .get(nickname)
            .ok_or_else(|| SourceError::UnknownSource(nickname.to_owned()))?;
        constructor(config)
    }
}
