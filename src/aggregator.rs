use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

use crate::config::{Config, FeedConfig, FeedRegistry};
use crate::db::{Database, ItemFilter, NewsItem};
use crate::error::{Error, Result};
use crate::fetcher::{Fetcher, SourceTarget, HACKER_NEWS_TAG, RSS_TAG_PREFIX};

/// Selector sentinel meaning "no source filter".
pub const ALL_SOURCES: &str = "all";
pub const DEFAULT_FEED_LIMIT: i64 = 30;

/// A source known to the system, whether or not it has cached data yet.
#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredSource {
    pub tag: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Configured registrations and the tags actually present in the cache,
/// reported separately: a registration may have no data yet, and cached
/// data may outlive a removed registration.
#[derive(Debug, Serialize)]
pub struct SourceListing {
    pub configured: Vec<ConfiguredSource>,
    pub cached: Vec<String>,
}

/// Per-source result of a refresh: an item count on success, a failure
/// message otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshOutcome {
    fn fetched(source: String, items: usize) -> Self {
        Self {
            source,
            items: Some(items),
            error: None,
        }
    }

    fn failed(source: String, error: String) -> Self {
        Self {
            source,
            items: None,
            error: Some(error),
        }
    }
}

/// Orchestrates multi-source refresh and answers the user-facing queries.
/// Holds its collaborators as explicit handles constructed once at
/// process start.
pub struct Aggregator {
    db: Arc<Database>,
    fetcher: Arc<Fetcher>,
    registry: Arc<FeedRegistry>,
    fetch_limit: usize,
    retention_days: i64,
}

impl Aggregator {
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<Fetcher>,
        registry: Arc<FeedRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            fetcher,
            registry,
            fetch_limit: config.fetch_limit,
            retention_days: config.retention_days,
        }
    }

    pub async fn list_sources(&self) -> Result<SourceListing> {
        let mut configured = vec![ConfiguredSource {
            tag: HACKER_NEWS_TAG.to_string(),
            name: "Hacker News".to_string(),
            url: None,
        }];
        for feed in self.registry.list().await {
            configured.push(ConfiguredSource {
                tag: format!("{RSS_TAG_PREFIX}{}", feed.name),
                name: feed.name,
                url: Some(feed.url),
            });
        }

        let cached = self.db.list_sources().await?;
        Ok(SourceListing { configured, cached })
    }

    /// The ranked feed: optional exact source tag (or "all"), optional
    /// limit (default 30), optional "published within the last N hours"
    /// window translated into an absolute cutoff.
    pub async fn get_feed(
        &self,
        selector: Option<&str>,
        limit: Option<i64>,
        within_hours: Option<i64>,
    ) -> Result<Vec<NewsItem>> {
        let source = match selector.map(str::trim) {
            None => None,
            Some("") => {
                return Err(Error::InvalidArgument(
                    "source selector must not be empty".to_string(),
                ))
            }
            Some(ALL_SOURCES) => None,
            Some(tag) => Some(tag.to_string()),
        };

        let limit = limit.unwrap_or(DEFAULT_FEED_LIMIT);
        if limit <= 0 {
            return Err(Error::InvalidArgument(format!(
                "limit must be positive, got {limit}"
            )));
        }

        let published_after = match within_hours {
            None => None,
            Some(hours) if hours <= 0 => {
                return Err(Error::InvalidArgument(format!(
                    "hours must be positive, got {hours}"
                )))
            }
            Some(hours) => Some(Utc::now() - chrono::Duration::hours(hours)),
        };

        self.db
            .query_items(&ItemFilter {
                source,
                published_after,
                limit: Some(limit),
            })
            .await
    }

    /// Refresh the selected sources. Fetches are issued concurrently and
    /// awaited together; a failing source is recorded in its outcome and
    /// never aborts the others. Only a store failure aborts the whole
    /// operation.
    pub async fn refresh(&self, selector: Option<&str>) -> Result<Vec<RefreshOutcome>> {
        let targets = self.resolve_targets(selector).await?;
        info!("refreshing {} source(s)", targets.len());

        let outcomes = join_all(targets.iter().map(|t| self.refresh_source(t))).await;
        outcomes.into_iter().collect()
    }

    async fn refresh_source(&self, target: &SourceTarget) -> Result<RefreshOutcome> {
        let tag = target.tag();
        match self.fetcher.fetch(target, self.fetch_limit).await {
            Ok(items) => {
                self.db.upsert_batch(&items).await?;
                info!("cached {} item(s) from {tag}", items.len());
                Ok(RefreshOutcome::fetched(tag, items.len()))
            }
            Err(e) => {
                error!("failed to refresh {tag}: {e}");
                Ok(RefreshOutcome::failed(tag, e.to_string()))
            }
        }
    }

    async fn resolve_targets(&self, selector: Option<&str>) -> Result<Vec<SourceTarget>> {
        let feeds = self.registry.list().await;

        match selector.map(str::trim) {
            None | Some(ALL_SOURCES) => {
                let mut targets = vec![SourceTarget::HackerNews];
                targets.extend(feeds.iter().map(SourceTarget::from_feed));
                Ok(targets)
            }
            Some(HACKER_NEWS_TAG) => Ok(vec![SourceTarget::HackerNews]),
            Some("rss") => Ok(feeds.iter().map(SourceTarget::from_feed).collect()),
            Some(tag) if tag.starts_with(RSS_TAG_PREFIX) => {
                let name = &tag[RSS_TAG_PREFIX.len()..];
                match feeds.iter().find(|f| f.name == name) {
                    Some(feed) => Ok(vec![SourceTarget::from_feed(feed)]),
                    None => Err(Error::InvalidArgument(format!(
                        "no registered feed named `{name}`"
                    ))),
                }
            }
            Some(other) => Err(Error::InvalidArgument(format!(
                "unknown source selector `{other}`"
            ))),
        }
    }

    pub async fn search(&self, query: &str, limit: Option<i64>) -> Result<Vec<NewsItem>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument(
                "search query must not be empty".to_string(),
            ));
        }
        if let Some(limit) = limit {
            if limit <= 0 {
                return Err(Error::InvalidArgument(format!(
                    "limit must be positive, got {limit}"
                )));
            }
        }

        self.db.search_items(query, limit).await
    }

    pub async fn add_feed(&self, name: &str, url: &str) -> Result<FeedConfig> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "feed name must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidArgument(format!(
                "feed url must be http(s), got `{url}`"
            )));
        }

        self.registry.add(name, url).await
    }

    /// Returns whether a registration with that name existed.
    pub async fn remove_feed(&self, name: &str) -> Result<bool> {
        self.registry.remove(name).await
    }

    /// Apply the configured retention window. Returns the count evicted.
    pub async fn evict_stale(&self) -> Result<u64> {
        let removed = self.db.evict_older_than(self.retention_days).await?;
        if removed > 0 {
            info!(
                "evicted {removed} item(s) cached more than {} day(s) ago",
                self.retention_days
            );
        }
        Ok(removed)
    }
}

/// Refresh everything on startup, then on the configured interval, with
/// stale entries pruned after each pass.
pub async fn start_background_refresh(aggregator: Arc<Aggregator>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    info!("starting initial refresh");
    run_refresh_pass(&aggregator).await;

    loop {
        tokio::time::sleep(interval).await;
        info!("starting scheduled refresh");
        run_refresh_pass(&aggregator).await;
    }
}

async fn run_refresh_pass(aggregator: &Aggregator) {
    if let Err(e) = aggregator.refresh(None).await {
        error!("refresh failed: {e}");
    }
    if let Err(e) = aggregator.evict_stale().await {
        error!("eviction failed: {e}");
    }
}
