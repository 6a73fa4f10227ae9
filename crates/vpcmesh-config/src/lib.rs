pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vpcmesh_cloud::RetryConfig;

/// Environment variable naming the configuration file directly
pub const CONFIG_PATH_ENV: &str = "VPCMESH_CONFIG_PATH";

const LOCAL_CANDIDATES: [&str; 2] = ["vpcmesh.yaml", ".vpcmesh.yaml"];

/// Operator configuration
///
/// Every field has a default so an empty document (or no file at all) is a
/// valid configuration for `list` and `delete`. `create` additionally needs
/// an image for each participant region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Gateway machine image per region name
    pub images: BTreeMap<String, String>,
    pub instance_type: String,
    /// Concurrent region queries during fan-out
    pub fanout_workers: usize,
    pub poll_interval_secs: u64,
    pub launch_timeout_secs: u64,
    pub terminate_timeout_secs: u64,
    /// Retry policy for security group authorization right after creation
    pub authorize_retry: RetrySettings,
    /// Retry policy for address release and security group deletion during cleanup
    pub cleanup_retry: RetrySettings,
    /// Value of the `Name` tag on every gateway instance
    pub name_tag: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            images: BTreeMap::new(),
            instance_type: "t3.micro".to_string(),
            fanout_workers: 8,
            poll_interval_secs: 15,
            launch_timeout_secs: 300,
            terminate_timeout_secs: 600,
            authorize_retry: RetrySettings {
                max_attempts: 4,
                initial_delay_ms: 5_000,
                max_delay_ms: None,
                multiplier: 1.0,
            },
            cleanup_retry: RetrySettings {
                max_attempts: 6,
                initial_delay_ms: 2_000,
                max_delay_ms: Some(30_000),
                multiplier: 2.0,
            },
            name_tag: "vpcmesh".to_string(),
        }
    }
}

/// Serialized form of a retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    /// Upper bound for a single delay; unset means no growth beyond the
    /// initial delay for a fixed policy, and 30s otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        let initial_delay = Duration::from_millis(self.initial_delay_ms);
        let max_delay = match self.max_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.multiplier <= 1.0 => initial_delay,
            None => Duration::from_secs(30),
        };
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier: self.multiplier,
        }
    }
}

impl MeshConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(path: &Path, content: &str) -> Result<Self> {
        // serde_yaml rejects an empty document; treat it as "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(path, &content)
    }

    /// Load the first configuration file found, or defaults when there is none
    pub fn load() -> Result<Self> {
        match find_config_file()? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading configuration");
                Self::from_path(&path)
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.fanout_workers == 0 {
            return Err(ConfigError::Invalid("fanout_workers must be at least 1".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be at least 1".into()));
        }
        if self.instance_type.trim().is_empty() {
            return Err(ConfigError::Invalid("instance_type must not be empty".into()));
        }
        Ok(())
    }

    pub fn image_for(&self, region: &str) -> Option<&str> {
        self.images.get(region).map(String::as_str)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

/// Locate the configuration file
///
/// Search order:
/// 1. `VPCMESH_CONFIG_PATH` (must exist when set)
/// 2. current directory: `vpcmesh.yaml`, `.vpcmesh.yaml`
/// 3. `<config_dir>/vpcmesh/config.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Some(config_path) = std::env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &LOCAL_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("vpcmesh").join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}
