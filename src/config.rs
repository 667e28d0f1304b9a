use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const TOKEN_ENV: &str = "ZENHUB_TOKEN";
pub const DEFAULT_API_URL: &str = "https://api.zenhub.com/public/graphql";

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub zenhub: ZenhubConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZenhubConfig {
    pub token: Option<String>,
    pub api_url: String,
    pub timeout_secs: u64,
    pub page_size: u32,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ZenhubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            page_size: 50,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl ZenhubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".zenhub-rag")
        .join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(toml::from_str(contents)?)
}

/// Picks the token from the command line / environment first, then the
/// config file. Blank values count as missing.
pub fn resolve_token(cli_or_env: Option<&str>, config: &ZenhubConfig) -> Option<String> {
    cli_or_env
        .or(config.token.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}
