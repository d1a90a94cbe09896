//! Configuration for checkpointstore

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::StoreOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the checkpoint directory
    #[serde(default = "default_store_path", rename = "store-path")]
    pub store_path: PathBuf,

    /// Retention limit
    #[serde(default = "default_max_checkpoints", rename = "max-checkpoints")]
    pub max_checkpoints: usize,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskweave")
        .join("checkpoints")
}

fn default_max_checkpoints() -> usize {
    crate::DEFAULT_MAX_CHECKPOINTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_checkpoints: default_max_checkpoints(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("checkpointstore").join("config.yml")),
            Some(PathBuf::from("checkpointstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_checkpoints: self.max_checkpoints,
        }
    }
}
