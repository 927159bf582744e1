use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use feed_rs::parser;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::db::{Engagement, NewsItem};
use crate::error::Result;
use crate::ranker;

/// Source tag for the Hacker News item tracker.
pub const HACKER_NEWS_TAG: &str = "hackernews";
/// Namespace prefix for registered RSS feeds, so multiple feeds coexist
/// without tag collisions.
pub const RSS_TAG_PREFIX: &str = "rss:";

const HN_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";

/// One upstream source a refresh can fetch from.
#[derive(Debug, Clone)]
pub enum SourceTarget {
    HackerNews,
    Rss { name: String, url: String },
}

impl SourceTarget {
    pub fn from_feed(feed: &FeedConfig) -> Self {
        Self::Rss {
            name: feed.name.clone(),
            url: feed.url.clone(),
        }
    }

    pub fn tag(&self) -> String {
        match self {
            Self::HackerNews => HACKER_NEWS_TAG.to_string(),
            Self::Rss { name, .. } => format!("{RSS_TAG_PREFIX}{name}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HnStory {
    id: i64,
    title: Option<String>,
    url: Option<String>,
    text: Option<String>,
    by: Option<String>,
    score: Option<i64>,
    descendants: Option<i64>,
    time: Option<i64>,
}

pub struct Fetcher {
    client: Client,
    hn_api_base: String,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::with_hn_api_base(HN_API_BASE)
    }

    /// Point the Hacker News adapter at a different API root (tests).
    pub fn with_hn_api_base<S: Into<String>>(base: S) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("NewsDesk/0.1 (news aggregator)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            hn_api_base: base.into(),
        }
    }

    /// Fetch up to `limit` items from one source, normalized and scored.
    /// Fetch failures surface as errors, never as a silently empty list.
    pub async fn fetch(&self, target: &SourceTarget, limit: usize) -> Result<Vec<NewsItem>> {
        match target {
            SourceTarget::HackerNews => self.fetch_hackernews(limit).await,
            SourceTarget::Rss { name, url } => self.fetch_rss(name, url, limit).await,
        }
    }

    async fn fetch_hackernews(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let ids: Vec<i64> = self
            .client
            .get(format!("{}/topstories.json", self.hn_api_base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let now = Utc::now();
        let stories = join_all(ids.into_iter().take(limit).map(|id| self.fetch_story(id))).await;

        let mut items = Vec::new();
        for story in stories {
            match story {
                // The item endpoint serves `null` for dead or dangling ids.
                Ok(Some(story)) => items.push(story_to_item(story, now)),
                Ok(None) => {}
                Err(e) => warn!("skipping story that failed to fetch: {e}"),
            }
        }

        info!("fetched {} stories from {HACKER_NEWS_TAG}", items.len());
        Ok(items)
    }

    async fn fetch_story(&self, id: i64) -> Result<Option<HnStory>> {
        let story = self
            .client
            .get(format!("{}/item/{id}.json", self.hn_api_base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(story)
    }

    async fn fetch_rss(&self, name: &str, url: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let parsed = parser::parse(&bytes[..])?;

        let source = format!("{RSS_TAG_PREFIX}{name}");
        let now = Utc::now();
        let items: Vec<NewsItem> = parsed
            .entries
            .into_iter()
            .take(limit)
            .filter_map(|entry| entry_to_item(&source, entry, now))
            .collect();

        info!("fetched {} entries from {source}", items.len());
        Ok(items)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn story_to_item(story: HnStory, now: DateTime<Utc>) -> NewsItem {
    let title = story.title.unwrap_or_else(|| "Untitled".to_string());
    // Ask HN and similar text posts carry no external URL.
    let url = story
        .url
        .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", story.id));
    let published_at = story
        .time
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .unwrap_or(now);

    let mut item = NewsItem {
        id: format!("{HACKER_NEWS_TAG}:{}", story.id),
        source: HACKER_NEWS_TAG.to_string(),
        title,
        url,
        content: story.text,
        author: story.by,
        engagement: Some(Engagement {
            points: story.score.unwrap_or(0).max(0) as u32,
            comments: story.descendants.unwrap_or(0).max(0) as u32,
        }),
        published_at,
        cached_at: now,
        rank_score: 0.0,
    };
    item.rank_score = ranker::score_at(&item, now);
    item
}

/// Map one parsed feed entry into a scored [`NewsItem`]. Entries without
/// any link are dropped; a missing publication date is backfilled with
/// the ingestion time.
pub fn entry_to_item(source: &str, entry: feed_rs::model::Entry, now: DateTime<Utc>) -> Option<NewsItem> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "Untitled".to_string());

    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();
    if url.is_empty() {
        warn!("skipping entry with no link: {title}");
        return None;
    }

    let upstream = if entry.id.is_empty() {
        url.clone()
    } else {
        entry.id.clone()
    };

    let content = entry
        .summary
        .map(|t| t.content)
        .or_else(|| entry.content.and_then(|c| c.body));
    let author = entry.authors.first().map(|a| a.name.clone());
    let published_at = entry.published.or(entry.updated).unwrap_or(now);

    let mut item = NewsItem {
        id: format!("{source}:{upstream}"),
        source: source.to_string(),
        title,
        url,
        content,
        author,
        engagement: None,
        published_at,
        cached_at: now,
        rank_score: 0.0,
    };
    item.rank_score = ranker::score_at(&item, now);
    Some(item)
}
