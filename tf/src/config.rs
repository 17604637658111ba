//! txnflow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main txnflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File and database locations
    pub storage: StorageConfig,

    /// Worker pool limits
    pub workers: WorkerConfig,

    /// Materialization batching
    pub materialize: MaterializeConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .txnflow.yml
        let local_config = PathBuf::from(".txnflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/txnflow/txnflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("txnflow").join("txnflow.yml");
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

/// File and database locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory where uploaded CSV bytes are stored
    #[serde(rename = "upload-dir")]
    pub upload_dir: PathBuf,

    /// Path of the SQLite database backing every stage
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/txnflow on Linux)
        let data_dir = dirs::data_dir()
            .map(|d| d.join("txnflow"))
            .unwrap_or_else(|| PathBuf::from(".txnflow"));

        Self {
            upload_dir: data_dir.join("uploads"),
            database_path: data_dir.join("txnflow.db"),
        }
    }
}

/// Worker pool limits
///
/// Each stage consumes its queue with a bounded pool; work for a single
/// file id is still processed end-to-end by one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum files processed concurrently per stage
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Bounded capacity of each queue channel
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            queue_capacity: 50,
        }
    }
}

/// Materialization batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeConfig {
    /// Rows per bulk insert
    #[serde(rename = "batch-size")]
    pub batch_size: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.workers.max_concurrent, 5);
        assert_eq!(config.workers.queue_capacity, 50);
        assert_eq!(config.materialize.batch_size, 1000);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
storage:
  upload-dir: /tmp/txnflow/uploads
  database-path: /tmp/txnflow/db.sqlite

workers:
  max-concurrent: 2
  queue-capacity: 8

materialize:
  batch-size: 250
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/txnflow/uploads"));
        assert_eq!(config.workers.max_concurrent, 2);
        assert_eq!(config.materialize.batch_size, 250);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
workers:
  max-concurrent: 3
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.workers.max_concurrent, 3);

        // Defaults for unspecified
        assert_eq!(config.workers.queue_capacity, 50);
        assert_eq!(config.materialize.batch_size, 1000);
    }
}
