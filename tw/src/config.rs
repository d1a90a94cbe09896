//! Taskweave configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use checkpointstore::{DEFAULT_MAX_CHECKPOINTS, StoreOptions};

/// Main taskweave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wave loop limits
    pub orchestrator: OrchestratorConfig,

    /// Failure recovery limits
    pub recovery: RecoveryConfig,

    /// Ingestion and decomposition
    pub planning: PlanningConfig,

    /// Shell executor settings
    pub executor: ExecutorConfig,

    /// Checkpoint store location and retention
    pub checkpoints: CheckpointsConfig,

    /// Log level used when RUST_LOG is unset
    #[serde(rename = "log-level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            recovery: RecoveryConfig::default(),
            planning: PlanningConfig::default(),
            executor: ExecutorConfig::default(),
            checkpoints: CheckpointsConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local: .taskweave.yml
        let local_config = PathBuf::from(".taskweave.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User: ~/.config/taskweave/taskweave.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskweave").join("taskweave.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Wave loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for one request, checked at each wave start
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Upper bound on waves per request
    #[serde(rename = "max-waves")]
    pub max_waves: usize,

    /// Tasks dispatched at once within a wave
    #[serde(rename = "max-concurrent-tasks")]
    pub max_concurrent_tasks: usize,

    /// Snapshot target files before waves with mutating tasks
    #[serde(rename = "checkpoint-before-mutation")]
    pub checkpoint_before_mutation: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            max_waves: 100,
            max_concurrent_tasks: 8,
            checkpoint_before_mutation: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Failure recovery limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Fix tasks allowed per task before it is failed
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Ingestion and decomposition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Decomposition rounds before tasks are taken as atomic
    #[serde(rename = "max-depth")]
    pub max_depth: usize,

    /// Accept dependencies that name tasks outside the plan
    #[serde(rename = "allow-external-dependencies")]
    pub allow_external_dependencies: bool,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            allow_external_dependencies: false,
        }
    }
}

/// Shell executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Shell used as `<shell> -c <command>`
    pub shell: String,

    /// Per-command timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Directory commands run in; current directory when unset
    #[serde(rename = "working-dir")]
    pub working_dir: Option<PathBuf>,

    /// Output is truncated past this many characters
    #[serde(rename = "max-output-chars")]
    pub max_output_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout_ms: 120_000,
            working_dir: None,
            max_output_chars: 30_000,
        }
    }
}

/// Checkpoint store location and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointsConfig {
    /// Checkpoint directory
    pub dir: PathBuf,

    /// Checkpoints kept before eviction
    #[serde(rename = "max-checkpoints")]
    pub max_checkpoints: usize,
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        let dir = dirs::data_local_dir()
            .map(|d| d.join("taskweave").join("checkpoints"))
            .unwrap_or_else(|| PathBuf::from(".taskweave/checkpoints"));
        Self {
            dir,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
        }
    }
}

impl CheckpointsConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_checkpoints: self.max_checkpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.orchestrator.max_waves, 100);
        assert_eq!(config.recovery.max_retries, 3);
        assert_eq!(config.planning.max_depth, 3);
        assert_eq!(config.executor.shell, "sh");
        assert_eq!(config.checkpoints.max_checkpoints, DEFAULT_MAX_CHECKPOINTS);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
orchestrator:
  timeout-secs: 60
  max-waves: 10
  max-concurrent-tasks: 2
  checkpoint-before-mutation: false

recovery:
  max-retries: 5

planning:
  max-depth: 1
  allow-external-dependencies: true

executor:
  shell: bash
  timeout-ms: 5000
  working-dir: /tmp/work

checkpoints:
  dir: /tmp/ckpts
  max-checkpoints: 7

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.orchestrator.timeout(), Duration::from_secs(60));
        assert_eq!(config.orchestrator.max_concurrent_tasks, 2);
        assert!(!config.orchestrator.checkpoint_before_mutation);
        assert_eq!(config.recovery.max_retries, 5);
        assert!(config.planning.allow_external_dependencies);
        assert_eq!(config.executor.working_dir, Some(PathBuf::from("/tmp/work")));
        assert_eq!(config.checkpoints.store_options().max_checkpoints, 7);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
recovery:
  max-retries: 1
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.recovery.max_retries, 1);
        assert_eq!(config.orchestrator.max_waves, 100);
        assert_eq!(config.executor.max_output_chars, 30_000);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taskweave.yml");
        fs::write(&path, "orchestrator:\n  max-waves: 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.orchestrator.max_waves, 4);
    }

    #[test]
    fn test_load_explicit_path_missing_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
