use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::models::DEFAULT_DATA_SERVICE_ID;

pub const DEFAULT_GROUPS_URL: &str = "http://www.tvbrowser.org/listings/groups.txt";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

/// Knobs of the sync cycle
///
/// Every field is optional in the file; the accessors apply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub groups_url: Option<String>,
    pub data_service_id: Option<String>,
    pub days_to_load: Option<u32>,
    pub day_start_hour: Option<u32>,
    pub day_end_hour: Option<u32>,
    pub probe_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub worker_threads: Option<usize>,
    pub user_agent: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./tvdata.db".to_string(),
            max_connections: Some(10),
        }
    }
}

impl SyncConfig {
    pub fn groups_url(&self) -> &str {
        self.groups_url.as_deref().unwrap_or(DEFAULT_GROUPS_URL)
    }

    pub fn data_service_id(&self) -> &str {
        self.data_service_id
            .as_deref()
            .unwrap_or(DEFAULT_DATA_SERVICE_ID)
    }

    pub fn days_to_load(&self) -> i64 {
        i64::from(self.days_to_load.unwrap_or(2))
    }

    pub fn day_start_hour(&self) -> u32 {
        self.day_start_hour.unwrap_or(0).min(24)
    }

    pub fn day_end_hour(&self) -> u32 {
        self.day_end_hour.unwrap_or(24).min(24)
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.probe_timeout_secs.unwrap_or(5))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.unwrap_or(60))
    }

    /// Size of the decode pool, never below two
    pub fn worker_threads(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.worker_threads.unwrap_or(available).max(2)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("tvdata-sync/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("day_start_hour", self.day_start_hour),
            ("day_end_hour", self.day_end_hour),
        ] {
            if let Some(hour) = value.filter(|h| *h > 24) {
                warn!("sync.{} = {} is out of range, clamping to 24", name, hour);
            }
        }

        if self.day_start_hour() > self.day_end_hour() {
            return Err(AppError::configuration(format!(
                "sync.day_start_hour ({}) must not be after sync.day_end_hour ({})",
                self.day_start_hour(),
                self.day_end_hour()
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Reads `path`, writing the defaults there first if it does not exist
    pub fn load(path: &Path) -> AppResult<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                AppError::configuration(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Self::from_toml(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config).map_err(|e| {
                AppError::configuration(format!("Failed to serialize defaults: {}", e))
            })?;
            std::fs::write(path, contents).map_err(|e| {
                AppError::configuration(format!("Failed to write {}: {}", path.display(), e))
            })?;
            info!("Wrote default configuration to {}", path.display());
            default_config
        };

        config.sync.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> AppResult<Self> {
        toml::from_str(contents)
            .map_err(|e| AppError::configuration(format!("Invalid configuration: {}", e)))
    }
}
