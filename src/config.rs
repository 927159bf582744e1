use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Background refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Items fetched per source per refresh
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    /// Eviction window in days, keyed off ingestion time
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_fetch_limit() -> usize {
    30
}

fn default_retention_days() -> i64 {
    7
}

/// One registered RSS feed. `name` and `url` are unique across the
/// registration list; `name` also forms the `rss:<name>` source tag.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Optional per-feed override, in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Owns the feed registration list and its backing TOML file. Every
/// mutation is written to disk before it becomes visible in memory, so a
/// failed write leaves the registration list untouched.
pub struct FeedRegistry {
    path: PathBuf,
    config: RwLock<Config>,
}

impl FeedRegistry {
    pub fn new<P: Into<PathBuf>>(path: P, config: Config) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
        }
    }

    pub async fn list(&self) -> Vec<FeedConfig> {
        self.config.read().await.feeds.clone()
    }

    /// Register a new feed. Fails with [`Error::DuplicateFeed`] if the URL
    /// or name is already registered.
    pub async fn add(&self, name: &str, url: &str) -> Result<FeedConfig> {
        let mut config = self.config.write().await;

        if let Some(existing) = config.feeds.iter().find(|f| f.url == url) {
            return Err(Error::DuplicateFeed(existing.url.clone()));
        }
        if config.feeds.iter().any(|f| f.name == name) {
            return Err(Error::DuplicateFeed(name.to_string()));
        }

        let feed = FeedConfig {
            name: name.to_string(),
            url: url.to_string(),
            refresh_interval: None,
        };

        let mut next = config.clone();
        next.feeds.push(feed.clone());
        next.save(&self.path)?;
        *config = next;

        Ok(feed)
    }

    /// Remove a registration by name. Returns whether one existed, so the
    /// caller can distinguish a no-op from a removal.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let mut config = self.config.write().await;

        if !config.feeds.iter().any(|f| f.name == name) {
            return Ok(false);
        }

        let mut next = config.clone();
        next.feeds.retain(|f| f.name != name);
        next.save(&self.path)?;
        *config = next;

        Ok(true)
    }
}
