// SPDX-License-Identifier: MIT OR Apache-2.0
//! Settings for the `loom` driver, stored as RON.

use loom_graph::{ConfigError, EngineConfig, GraphError};
use loom_scene::TraversalSettings;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors the driver reports before exiting
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be read or written
    #[error("Settings error: {0}")]
    Config(#[from] ConfigError),

    /// Building or evaluating the pipeline failed
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// No renderer registered under the name
    #[error("Unknown renderer: {0}")]
    UnknownRenderer(String),
}

/// Everything the driver reads from its settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Cache and history tunables
    pub engine: EngineConfig,
    /// Expansion and threading of the render traversal
    pub traversal: TraversalSettings,
    /// Registered renderer to send the scene to
    pub renderer: String,
    /// Extra `tracing` directives, comma separated
    pub log_filter: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            traversal: TraversalSettings::default(),
            renderer: "Log".to_string(),
            log_filter: "loom_app=debug".to_string(),
        }
    }
}

impl AppSettings {
    /// Load settings from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        let settings = ron::from_str(&contents).map_err(ConfigError::from)?;
        Ok(settings)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let config = PrettyConfig::default().struct_names(true);
        let contents = ron::ser::to_string_pretty(self, config).map_err(ConfigError::from)?;
        std::fs::write(path, contents).map_err(ConfigError::from)?;
        Ok(())
    }

    /// `log_filter` split into individual directives
    pub fn log_directives(&self) -> impl Iterator<Item = &str> {
        self.log_filter.split(',').map(str::trim).filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: AppSettings = ron::from_str("(renderer: \"Capture\", traversal: (threads: 2))").unwrap();
        assert_eq!(settings.renderer, "Capture");
        assert_eq!(settings.traversal.threads, 2);
        assert_eq!(settings.traversal.root, "/");
        assert_eq!(settings.engine, EngineConfig::default());
    }

    #[test]
    fn test_log_directives() {
        let settings = AppSettings {
            log_filter: "loom_app=debug, loom_graph=trace,,".to_string(),
            ..AppSettings::default()
        };
        let directives: Vec<_> = settings.log_directives().collect();
        assert_eq!(directives, vec!["loom_app=debug", "loom_graph=trace"]);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("loom-app-{}.ron", std::process::id()));
        let mut settings = AppSettings::default();
        settings.traversal.min_expansion_depth = 3;
        settings.save(&path).unwrap();
        assert_eq!(AppSettings::load(&path).unwrap(), settings);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = AppSettings::load("/definitely/not/here.ron");
        assert!(matches!(result, Err(AppError::Config(ConfigError::Io(_)))));
    }
}
