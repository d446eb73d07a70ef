//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Roughly the per-origin budget browsers give `localStorage`
const DEFAULT_QUOTA_BYTES: i64 = 5 * 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub profile: ProfileConfig,
    pub logging: LoggingConfig,
}

/// Local storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory holding one file per key (file backend only)
    pub path: PathBuf,
    /// Maximum bytes of keys plus values; unlimited when absent
    pub quota_bytes: Option<usize>,
}

/// Storage backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

/// Profile defaults for a fresh storage
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Display name used until the user sets one
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Profile image reference used until the user sets one
    #[serde(default = "default_profile_image")]
    pub profile_image: String,
}

fn default_display_name() -> String {
    "Ali Rıza".to_string()
}

fn default_profile_image() -> String {
    "/profileIcon.png".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEEDSTORE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("storage.backend", "file")?
            .set_default("storage.path", "data")?
            .set_default("storage.quota_bytes", DEFAULT_QUOTA_BYTES)?
            .set_default("profile.display_name", default_display_name())?
            .set_default("profile.profile_image", default_profile_image())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FEEDSTORE__*)
            .add_source(
                Environment::with_prefix("FEEDSTORE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.storage.quota_bytes == Some(0) {
            return Err(crate::error::AppError::Config(
                "storage.quota_bytes must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::File
            && self.storage.path.as_os_str().is_empty()
        {
            return Err(crate::error::AppError::Config(
                "storage.path is required when storage.backend=file".to_string(),
            ));
        }

        if self.profile.display_name.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "profile.display_name must not be empty".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(crate::error::AppError::Config(format!(
                "logging.level must be trace, debug, info, warn or error, got {}",
                self.logging.level
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}
