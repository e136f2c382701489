//! Project and storage configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

/// File names searched for when discovering a project
pub const CONFIG_FILE_NAMES: [&str; 2] = ["keepsake.yaml", "keepsake.yml"];

/// Storage location used when the project config does not name one
pub const DEFAULT_STORAGE: &str = ".keepsake/storage/";

/// Project configuration read from `keepsake.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Storage URL or path (relative paths are resolved against the project directory)
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Backend tuning
    #[serde(default)]
    pub storage_options: StorageConfig,
}

fn default_storage() -> String {
    DEFAULT_STORAGE.to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            storage_options: StorageConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Parse a config from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty file is a valid config with all defaults
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Read a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text).map_err(|e| Error::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Find the nearest config file at or above `start`
    ///
    /// Returns the parsed config and the directory containing it.
    pub fn find_in_dir(start: &Path) -> Result<(Self, PathBuf)> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            for name in CONFIG_FILE_NAMES {
                let candidate = current.join(name);
                if candidate.is_file() {
                    debug!(path = ?candidate, "Found project config");
                    return Ok((Self::load(&candidate)?, current.to_path_buf()));
                }
            }
            dir = current.parent();
        }

        Err(Error::ConfigNotFound {
            dir: start.display().to_string(),
        })
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Retry policy for remote backends
    pub retry: RetryConfig,

    /// Maximum artifact deletions in flight for one checkpoint
    pub delete_concurrency: usize,

    /// S3 client settings
    pub s3: S3Options,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            delete_concurrency: 16,
            s3: S3Options::default(),
        }
    }
}

/// S3 client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Options {
    /// AWS region
    pub region: String,

    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,

    /// Force path-style addressing (required for MinIO)
    pub force_path_style: bool,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries
    pub max_retries: u32,

    /// Initial delay before first retry
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Durations are written as integer milliseconds
mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
