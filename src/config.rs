//! Pipeline configuration.
//!
//! Loaded from a TOML file whose sections all default, so an empty or missing
//! file yields the stock thresholds (split at 300 BBLs, resolution 0.1,
//! 2000-character index records, 365-day registration expiration window).

use crate::error::{PortfolioError, Result};
use crate::schema::ContactType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub search_index: SearchIndexConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How business addresses are standardized before extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StandardizationMode {
    /// Whitespace squish only
    #[default]
    Passthrough,
    /// Squish plus USPS street suffix / directional abbreviation
    #[value(alias = "street_suffixes")]
    StreetSuffixes,
}

/// Contact extraction settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractConfig {
    /// Registrations that expired longer ago than this are dropped; `None`
    /// or 0 disables the filter
    #[serde(default = "default_max_expiration_age_days")]
    pub max_expiration_age_days: Option<u32>,

    #[serde(default = "default_allowed_contact_types")]
    pub allowed_contact_types: Vec<ContactType>,

    #[serde(default)]
    pub address_standardization: StandardizationMode,
}

fn default_max_expiration_age_days() -> Option<u32> {
    Some(365)
}

fn default_allowed_contact_types() -> Vec<ContactType> {
    ContactType::ALL.to_vec()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_expiration_age_days: default_max_expiration_age_days(),
            allowed_contact_types: default_allowed_contact_types(),
            address_standardization: StandardizationMode::default(),
        }
    }
}

/// Portfolio splitting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitConfig {
    /// Components with more unique BBLs than this are split
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Louvain resolution; lower favors fewer, larger communities
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

fn default_max_size() -> usize {
    300
}

fn default_resolution() -> f64 {
    0.1
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            resolution: default_resolution(),
        }
    }
}

/// Search index feed settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchIndexConfig {
    /// Maximum joined landlord_names length per record
    #[serde(default = "default_max_record_len")]
    pub max_record_len: usize,

    /// Attempts at the whole index publish before giving up
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,
}

fn default_max_record_len() -> usize {
    2000
}

fn default_publish_retries() -> u32 {
    3
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            max_record_len: default_max_record_len(),
            publish_retries: default_publish_retries(),
        }
    }
}

/// Portfolio table settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Rows per insert transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    5000
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl PipelineConfig {
    /// Load configuration from a TOML file, or defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PortfolioError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.split.max_size == 0 {
            return Err(PortfolioError::config("split.max_size must be at least 1"));
        }
        if !self.split.resolution.is_finite() || self.split.resolution <= 0.0 {
            return Err(PortfolioError::config(format!(
                "split.resolution must be a positive number, got {}",
                self.split.resolution
            )));
        }
        if self.search_index.max_record_len == 0 {
            return Err(PortfolioError::config(
                "search_index.max_record_len must be at least 1",
            ));
        }
        if self.export.batch_size == 0 {
            return Err(PortfolioError::config("export.batch_size must be at least 1"));
        }
        if self.extract.allowed_contact_types.is_empty() {
            return Err(PortfolioError::config(
                "extract.allowed_contact_types must not be empty",
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(PortfolioError::config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Expiration window in days, with 0 treated as disabled
    pub fn max_expiration_age_days(&self) -> Option<u32> {
        self.extract.max_expiration_age_days.filter(|d| *d > 0)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PortfolioError::config(format!("Failed to serialize config: {}", e)))
    }
}
