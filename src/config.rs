use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::DEFAULT_CONVERSATION_TITLE;

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "CHATSYNC_API_URL";
/// Environment variable supplying the bearer token
pub const TOKEN_ENV: &str = "CHATSYNC_TOKEN";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the conversation service
    pub api_url: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Bearer token; never written back by [`Config::save`]
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Title used for conversations created without one
    pub default_title: String,

    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Where this config lives; not part of the file
    #[serde(skip)]
    pub home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            api_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 60,
            token: None,
            default_title: DEFAULT_CONVERSATION_TITLE.to_string(),
            log_filter: "chatsync=info".to_string(),
            home: home.join(".chatsync"),
        }
    }
}

impl Config {
    /// Load `~/.chatsync/config.toml`, then apply environment overrides
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let mut config = Self::load_from(&home.join(".chatsync"))?;
        config.apply_env_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
        );
        Ok(config)
    }

    /// Load `config.toml` from a directory; a missing file yields defaults
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            Config::default()
        };
        ensure!(
            config.request_timeout_secs > 0,
            "request_timeout_secs must be at least 1 in {}",
            config_path.display()
        );

        config.home = dir.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.home)
            .context("Failed to create config directory")?;
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(self.home.join("config.toml"), content)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Environment wins over the file; blank values are ignored
    pub fn apply_env_overrides(&mut self, api_url: Option<String>, token: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = Some(token);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}
