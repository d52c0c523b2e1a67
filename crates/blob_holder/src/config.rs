//! Service configuration.

use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default upper bound for a single blob service call.
pub const DEFAULT_ITEM_TIMEOUT_MS: u64 = 30_000;

/// Default time between two reconciliation sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Where the blob service listens unless configured otherwise.
pub const DEFAULT_BLOB_SERVICE_URL: &str = "http://localhost:50053";

/// Configuration of the holder service.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HolderServiceConfig {
    /// Base URL of the blob service
    pub blob_service_url: String,

    /// Bearer token sent with every blob service request
    pub auth_token: Option<String>,

    /// Upper bound for a single establish or remove call, in milliseconds
    pub item_timeout_ms: u64,

    /// Time between reconciliation sweeps, in seconds
    pub sweep_interval_secs: u64,

    /// Holders database. Kept in memory if not set.
    pub database_path: Option<PathBuf>,

    /// Prefix for generated holder tokens, usually a device id
    pub holder_prefix: Option<String>,
}

impl Default for HolderServiceConfig {
    fn default() -> Self {
        Self {
            blob_service_url: DEFAULT_BLOB_SERVICE_URL.to_string(),
            auth_token: None,
            item_timeout_ms: DEFAULT_ITEM_TIMEOUT_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            database_path: None,
            holder_prefix: None,
        }
    }
}

impl HolderServiceConfig {
    /// Read and check a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_yaml(&yaml)?;
        tracing::debug!(?path, ?config, "loaded config");
        Ok(config)
    }

    /// Parse and check YAML config text.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> ConfigResult<()> {
        if self.blob_service_url()?.cannot_be_a_base() {
            return Err(ConfigError::NotABaseUrl(self.blob_service_url.clone()));
        }
        if self.item_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("item_timeout_ms"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("sweep_interval_secs"));
        }
        Ok(())
    }

    /// The parsed blob service URL
    pub fn blob_service_url(&self) -> ConfigResult<Url> {
        Ok(Url::parse(&self.blob_service_url)?)
    }

    /// Upper bound for a single blob service call
    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }

    /// Time between reconciliation sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
