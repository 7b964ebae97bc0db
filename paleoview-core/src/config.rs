//! Engine configuration.
//!
//! Configuration is read from TOML. Every key is optional; the defaults read
//! archives when present, keep one open archive per parameter for the whole
//! session and skip zero values in scalar series.
//!
//! ```toml
//! climate_data_directory = "/data/trace21"
//! bias_correction_directory = "/data/bias"
//! region_mask_directory = "/data/masks"
//! storage = "auto"
//!
//! [archive]
//! overlap_window = 100
//! handles_per_parameter = 1
//! cache_scope = "session"
//!
//! [scalar]
//! skip_zero_values = true
//! ```

use crate::archive::DEFAULT_OVERLAP_WINDOW;
use crate::errors::{PaleoError, PaleoResult};
use crate::loader::StorageMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifetime of cached archive handles
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Handles stay open across sequencer runs
    #[default]
    Session,
    /// Handles are closed at the start of every sequencer run
    PerRequest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Years each archive extends beyond its download interval
    pub overlap_window: u32,
    /// Open sub-interval handles kept per parameter
    pub handles_per_parameter: usize,
    pub cache_scope: CacheScope,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            overlap_window: DEFAULT_OVERLAP_WINDOW,
            handles_per_parameter: 1,
            cache_scope: CacheScope::Session,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScalarConfig {
    /// Skip series values that are exactly zero
    pub skip_zero_values: bool,
}

impl Default for ScalarConfig {
    fn default() -> Self {
        Self {
            skip_zero_values: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub climate_data_directory: PathBuf,
    pub bias_correction_directory: PathBuf,
    pub region_mask_directory: PathBuf,
    pub storage: StorageMode,
    pub archive: ArchiveConfig,
    pub scalar: ScalarConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> PaleoResult<Self> {
        toml::from_str(text).map_err(|e| PaleoError::malformed("configuration", e))
    }

    /// Read a configuration file; relative directories resolve against the
    /// file's own directory
    pub fn from_file(path: impl AsRef<Path>) -> PaleoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PaleoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self =
            toml::from_str(&text).map_err(|e| PaleoError::malformed(path.display().to_string(), e))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> PaleoResult<String> {
        toml::to_string(self).map_err(|e| PaleoError::malformed("configuration", e))
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for directory in [
            &mut self.climate_data_directory,
            &mut self.bias_correction_directory,
            &mut self.region_mask_directory,
        ] {
            if directory.is_relative() {
                *directory = base.join(&*directory);
            }
        }
    }
}
