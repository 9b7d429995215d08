//! Application configuration.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{OptimizeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::path::PathBuf;

/// Default connection string for the Redis Stack instance.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL (e.g., "redis://localhost:6379/0")
    #[serde(default = "default_redis_url")]
    pub url: String,
}

pub(crate) fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Settings for OpenAI-compatible embedding endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL for the API (e.g., "https://api.openai.com")
    #[serde(default = "default_openai_base")]
    pub api_base: String,

    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
}

fn default_openai_base() -> String {
    "https://api.openai.com".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: default_openai_base(),
            api_key: String::new(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Redis settings
    pub redis: RedisConfig,
    /// OpenAI-compatible embedding API settings
    pub openai: OpenAiConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    redis: Option<RedisFileSection>,
    openai: Option<OpenAiFileSection>,
}

#[derive(Debug, Deserialize)]
struct RedisFileSection {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (REDIS_URL, OPENAI_API_BASE, OPENAI_API_KEY)
    /// 2. Config file (~/.config/retrieval-optimizer/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        if let Ok(url) = env::var("REDIS_URL") {
            config.redis.url = url;
        }

        if let Ok(api_base) = env::var("OPENAI_API_BASE") {
            config.openai.api_base = api_base;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            config.openai.api_key = api_key;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OptimizeError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, filling gaps with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| OptimizeError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(redis) = file_config.redis {
            if let Some(url) = redis.url {
                config.redis.url = url;
            }
        }

        if let Some(openai) = file_config.openai {
            if let Some(api_base) = openai.api_base {
                config.openai.api_base = api_base;
            }
            if let Some(api_key) = openai.api_key {
                config.openai.api_key = api_key;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "retrieval-optimizer")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the settings needed for the OpenAI provider are present.
    pub fn validate_openai(&self) -> Result<()> {
        if self.openai.api_base.is_empty() {
            return Err(OptimizeError::Config(
                "OpenAI API base URL is required. Set OPENAI_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.openai.api_key.is_empty() {
            return Err(OptimizeError::Config(
                "OpenAI API key is required. Set OPENAI_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        Ok(())
    }
}
