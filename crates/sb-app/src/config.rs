//! YAML configuration for the batch host.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::template::DEFAULT_TEMPLATE;

pub const DEFAULT_CONFIG_FILE: &str = "simbatch.yaml";
pub const DEFAULT_GRID: &str = "256";
pub const DEFAULT_STEPS: &str = "1000";

/// Every field is optional in the file; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimbatchConfig {
    pub runs_root: PathBuf,
    pub project_root: Option<PathBuf>,
    pub python: Option<String>,
    pub script: Option<PathBuf>,
    pub default_grid: String,
    pub default_steps: String,
    pub command_template: String,
    pub equations_dir: Option<PathBuf>,
}

impl Default for SimbatchConfig {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from("runs"),
            project_root: None,
            python: None,
            script: None,
            default_grid: DEFAULT_GRID.to_string(),
            default_steps: DEFAULT_STEPS.to_string(),
            command_template: DEFAULT_TEMPLATE.to_string(),
            equations_dir: None,
        }
    }
}

impl SimbatchConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> AppResult<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found; using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = SimbatchConfig::from_yaml("runs_root: /data/runs\npython: python3\n").unwrap();
        assert_eq!(config.runs_root, PathBuf::from("/data/runs"));
        assert_eq!(config.python.as_deref(), Some("python3"));
        assert_eq!(config.default_grid, "256");
        assert_eq!(config.default_steps, "1000");
        assert_eq!(config.command_template, DEFAULT_TEMPLATE);
        assert_eq!(config.project_root, None);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(SimbatchConfig::from_yaml("").unwrap(), SimbatchConfig::default());
    }

    #[test]
    fn missing_file_falls_back() {
        let path = std::env::temp_dir().join("sb_app_no_such_config.yaml");
        let config = SimbatchConfig::load_or_default(&path).unwrap();
        assert_eq!(config, SimbatchConfig::default());
        assert!(matches!(
            SimbatchConfig::load(&path),
            Err(AppError::ConfigRead { .. })
        ));
    }
}
