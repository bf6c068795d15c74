//! Configuration file support

use potpie_chat::{PollConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for potpie
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Conversation service root URL
    pub base_url: Option<String>,
    /// User id used when allocating session ids
    pub user_id: Option<String>,
    /// Bearer token (alternative to POTPIE_TOKEN)
    pub token: Option<String>,
    /// Stream retries before falling back to polling
    pub max_retries: Option<u32>,
    /// How long to poll for the final message, in seconds
    pub poll_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("potpie")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("POTPIE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some("http://localhost:8001".to_string()),
            user_id: None,
            token: None,
            max_retries: Some(RetryConfig::default().max_retries),
            poll_timeout_secs: Some(PollConfig::default().timeout.as_secs()),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Service URL: POTPIE_BASE_URL, then NEXT_PUBLIC_CONVERSATION_BASE_URL, then the file
    pub fn base_url(&self) -> Option<String> {
        let from_env = std::env::var("POTPIE_BASE_URL")
            .or_else(|_| std::env::var("NEXT_PUBLIC_CONVERSATION_BASE_URL"))
            .ok();
        prefer(from_env, &self.base_url)
    }

    /// User id: POTPIE_USER_ID, then the file
    pub fn user_id(&self) -> Option<String> {
        prefer(std::env::var("POTPIE_USER_ID").ok(), &self.user_id)
    }

    /// Token: POTPIE_TOKEN, then the file
    pub fn token(&self) -> Option<String> {
        prefer(std::env::var("POTPIE_TOKEN").ok(), &self.token)
    }

    pub fn retry_config(&self) -> RetryConfig {
        match self.max_retries {
            Some(max_retries) => RetryConfig::with_max_retries(max_retries),
            None => RetryConfig::default(),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        let mut poll = PollConfig::default();
        if let Some(secs) = self.poll_timeout_secs {
            poll.timeout = Duration::from_secs(secs);
        }
        poll
    }
}

/// Non-empty override first, then the configured value
fn prefer(overriding: Option<String>, configured: &Option<String>) -> Option<String> {
    overriding
        .filter(|v| !v.trim().is_empty())
        .or_else(|| configured.clone())
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# potpie configuration file
# Place at ~/.config/potpie/config.toml (Linux/Mac) or %APPDATA%\potpie\config.toml (Windows)

# Conversation service URL (POTPIE_BASE_URL overrides it)
base_url = "http://localhost:8001"

# User id used to build session ids (POTPIE_USER_ID overrides it)
# user_id = "..."

# Bearer token; prefer the POTPIE_TOKEN environment variable
# token = "..."

# Stream retries before falling back to polling (1s, 2s, 4s backoff)
max_retries = 3

# Seconds to poll for the final message once streaming gives up
poll_timeout_secs = 30
"#
}
