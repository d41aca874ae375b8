use serde::Deserialize;
use std::path::Path;

use crate::model::{default_categories, Category};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Trending refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite:newswire.db?mode=rwc".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            language: default_language(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            bind: default_bind(),
            database_url: default_database_url(),
            provider: ProviderConfig::default(),
            categories: default_categories(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `NEWS_API_KEY`, `NEWS_API_URL` and `DATABASE_URL` overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("NEWS_API_KEY").filter(|k| !k.is_empty()) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("NEWS_API_URL").filter(|u| !u.is_empty()) {
            self.provider.base_url = url;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database_url = url;
        }
        self
    }
}
