//! Deployment configuration for the index pipeline.
//!
//! Values come from built-in defaults, optionally a JSON file, and finally
//! `FIELDSAT_*` environment variables.

use crate::types::{FieldError, FieldResult, IndexFormula};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CATALOG_URL: &str = "https://earth-search.aws.element84.com/v1/search";

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// STAC item search endpoint
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    /// Days of look-back for the catalog time range
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Index formulas computed on every invocation, in order
    #[serde(default = "default_formulas")]
    pub formulas: Vec<IndexFormula>,
    /// Directory for per-invocation scratch files
    #[serde(default = "std::env::temp_dir")]
    pub scratch_dir: PathBuf,
    /// Root directory of the local object store
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Topic name attached to no-data notifications
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
    /// Webhook receiving no-data notifications; log only when unset
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// GeoTIFF COMPRESS creation option for index rasters
    #[serde(default = "default_compression")]
    pub compression: String,
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_lookback_days() -> u32 {
    5
}

fn default_formulas() -> Vec<IndexFormula> {
    IndexFormula::ALL.to_vec()
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fieldsat")
        .join("artifacts")
}

fn default_notification_topic() -> String {
    "fieldsat-no-data".to_string()
}

fn default_http_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("fieldsat/{} (Field Index Processor)", env!("CARGO_PKG_VERSION"))
}

fn default_compression() -> String {
    "LZW".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            lookback_days: default_lookback_days(),
            formulas: default_formulas(),
            scratch_dir: std::env::temp_dir(),
            storage_root: default_storage_root(),
            notification_topic: default_notification_topic(),
            webhook_url: None,
            http_timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
            compression: default_compression(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FieldResult<Self> {
        log::info!("Loading pipeline config from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
            FieldError::InvalidInput(format!(
                "Invalid config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> FieldResult<Self> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `FIELDSAT_*` overrides from `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> FieldResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FIELDSAT_CATALOG_URL") {
            self.catalog_url = url;
        }
        if let Some(days) = lookup("FIELDSAT_LOOKBACK_DAYS") {
            self.lookback_days = days.trim().parse().map_err(|e| {
                FieldError::InvalidInput(format!("FIELDSAT_LOOKBACK_DAYS '{}': {}", days, e))
            })?;
        }
        if let Some(list) = lookup("FIELDSAT_FORMULAS") {
            self.formulas = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<FieldResult<Vec<_>>>()?;
        }
        if let Some(dir) = lookup("FIELDSAT_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FIELDSAT_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(dir);
        }
        if let Some(topic) = lookup("FIELDSAT_NOTIFICATION_TOPIC") {
            self.notification_topic = topic;
        }
        if let Some(url) = lookup("FIELDSAT_WEBHOOK_URL") {
            self.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(secs) = lookup("FIELDSAT_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = secs.trim().parse().map_err(|e| {
                FieldError::InvalidInput(format!("FIELDSAT_HTTP_TIMEOUT_SECS '{}': {}", secs, e))
            })?;
        }
        if let Some(compression) = lookup("FIELDSAT_COMPRESSION") {
            self.compression = compression;
        }

        self.validate()?;
        log::debug!("Pipeline config: {:?}", self);
        Ok(self)
    }

    pub fn validate(&self) -> FieldResult<()> {
        if self.lookback_days == 0 {
            return Err(FieldError::InvalidInput("lookback_days must be at least 1".to_string()));
        }
        if self.formulas.is_empty() {
            return Err(FieldError::InvalidInput("At least one index formula is required".to_string()));
        }
        if self.http_timeout_secs == 0 {
            return Err(FieldError::InvalidInput("http_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}
