//! BatchRun configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main BatchRun configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent workers
    pub workers: usize,

    /// Per-task retry ceiling (failures only; rate limits are exempt)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Ordered list of interchangeable endpoints, rotated on exhaustion
    pub endpoints: Vec<String>,

    /// Result store path (JSON array; the append log lives next to it)
    pub output: PathBuf,

    /// Pause after an endpoint switch before workers resume, in ms
    #[serde(rename = "switch-cooldown-ms")]
    pub switch_cooldown_ms: u64,

    /// Executor settings
    pub executor: ExecutorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 3,
            endpoints: Vec::new(),
            output: PathBuf::from("results.json"),
            switch_cooldown_ms: 1_000,
            executor: ExecutorConfig::default(),
        }
    }
}

/// Executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { timeout_ms: 60_000 }
    }
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(eyre::eyre!("workers must be at least 1"));
        }
        if self.endpoints.is_empty() {
            return Err(eyre::eyre!(
                "no endpoints configured. Set `endpoints` in the config file or pass --endpoint."
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .batchrun.yml
        let local_config = PathBuf::from(".batchrun.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/batchrun/batchrun.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("batchrun").join("batchrun.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
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
