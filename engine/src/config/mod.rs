//! Configuration management
//!
//! This module handles loading, validation, and management of the dealcoach
//! configuration. Configuration is stored in TOML format at
//! ~/.dealcoach/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory and log level
//! - **llm**: Workers AI endpoint, account, model, and token source
//! - **finalize**: Retry policy and polling timeout for finalization
//!
//! Paths support ~ expansion to the user's home directory. The API token is
//! never stored in the file; only the name of the environment variable that
//! holds it is.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::finalize::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM backend configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Finalization pipeline settings
    #[serde(default)]
    pub finalize: FinalizeConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the Workers AI API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cloudflare account identifier
    #[serde(default)]
    pub account_id: String,

    /// Model to run
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API token
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

/// Finalization pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeConfig {
    /// Maximum attempts per generation step, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds; doubles per attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// How long pollers wait for the report before giving up, in seconds
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LlmConfig::default(),
            finalize: FinalizeConfig::default(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            account_id: String::new(),
            model: default_model(),
            api_token_env: default_api_token_env(),
        }
    }
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating a default
    /// file on first run
    pub fn load_or_create() -> Result<Self> {
        let path = Self::default_path()?;

        if !path.exists() {
            let config = Config::default();
            config.save_to_path(&path)?;
            tracing::info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
        Ok(config)
    }

    /// Write this configuration to a path, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write config file at {}", path.display()))?;
        Ok(())
    }

    /// Default config file location: ~/.dealcoach/config.toml
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".dealcoach").join("config.toml"))
    }

    /// Location of the SQLite database under the (expanded) data directory
    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(expand_tilde(&self.core.data_dir)?.join("dealcoach.db"))
    }

    /// Retry policy for the finalization pipeline
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.finalize.max_attempts.max(1),
            base_delay: Duration::from_millis(self.finalize.backoff_ms),
        }
    }
}

/// Expand a leading ~ to the user's home directory
fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let Ok(stripped) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(stripped))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.dealcoach")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_model() -> String {
    "@cf/meta/llama-3.1-8b-instruct".to_string()
}

fn default_api_token_env() -> String {
    "CLOUDFLARE_API_TOKEN".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_poll_timeout_secs() -> u64 {
    120
}
