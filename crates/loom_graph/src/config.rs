// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine settings, stored as RON.

use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_HASH_CACHE_CAPACITY};
use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_DEPTH;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for a graph and its caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of computed values kept by a private compute cache
    pub cache_capacity: usize,
    /// Maximum number of memoized plug fingerprints
    pub hash_cache_capacity: usize,
    /// Maximum number of undo steps; zero disables undo
    pub history_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            hash_cache_capacity: DEFAULT_HASH_CACHE_CAPACITY,
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Load settings from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = ron::from_str(&contents)?;
        Ok(config)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = ron::ser::to_string_pretty(self, PrettyConfig::default().struct_names(true))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_roundtrip() {
        let config = EngineConfig {
            cache_capacity: 12,
            hash_cache_capacity: 34,
            history_depth: 5,
        };
        let text = ron::ser::to_string_pretty(&config, PrettyConfig::default().struct_names(true)).unwrap();
        let loaded: EngineConfig = ron::from_str(&text).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded: EngineConfig = ron::from_str("(history_depth: 3)").unwrap();
        assert_eq!(loaded.history_depth, 3);
        assert_eq!(loaded.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("loom-engine-{}.ron", std::process::id()));
        let config = EngineConfig::default();
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        let _ = std::fs::remove_file(&path);
    }
}
