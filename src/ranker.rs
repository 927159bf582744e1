//! Weighted heuristic ranking for news items.
//!
//! The score is the sum of four independent components, floored at zero:
//! keyword relevance, engagement, recency, and source quality. Keyword
//! and source data live in static tables so they can be extended without
//! touching the algorithm.

use chrono::{DateTime, Utc};

use crate::db::NewsItem;

struct KeywordCategory {
    #[allow(dead_code)]
    name: &'static str,
    weight: f64,
    keywords: &'static [&'static str],
}

/// Categories are scanned in declaration order; within a category only the
/// first matching keyword counts, so one spammy topic cannot stack its own
/// weight, while independent categories still add up.
const KEYWORD_CATEGORIES: &[KeywordCategory] = &[
    KeywordCategory {
        name: "ai",
        weight: 30.0,
        keywords: &[
            "ai",
            "llm",
            "agent",
            "machine learning",
            "neural",
            "transformer",
            "rag",
            "inference",
        ],
    },
    KeywordCategory {
        name: "devtools",
        weight: 25.0,
        keywords: &[
            "rust",
            "compiler",
            "open source",
            "cli",
            "sdk",
            "debugger",
            "profiler",
            "database",
        ],
    },
    KeywordCategory {
        name: "security",
        weight: 25.0,
        keywords: &[
            "vulnerability",
            "exploit",
            "cve",
            "encryption",
            "reverse engineering",
            "zero day",
        ],
    },
    KeywordCategory {
        name: "hands-on",
        weight: 15.0,
        keywords: &[
            "how to",
            "guide",
            "tutorial",
            "deep dive",
            "benchmark",
            "postmortem",
        ],
    },
    KeywordCategory {
        name: "funding",
        weight: -40.0,
        keywords: &[
            "raises",
            "series a",
            "series b",
            "series c",
            "valuation",
            "funding round",
            "ipo",
        ],
    },
    KeywordCategory {
        name: "corporate",
        weight: -20.0,
        keywords: &[
            "press release",
            "announces partnership",
            "appoints",
            "quarterly earnings",
        ],
    },
];

const PREMIUM_SOURCES: &[&str] = &["hackernews", "lobsters", "arstechnica", "lwn", "phoronix"];
const GENERAL_SOURCES: &[&str] = &["techcrunch", "businessinsider", "venturebeat", "forbes"];

const POINT_WEIGHT: f64 = 0.1;
const COMMENT_WEIGHT: f64 = 0.05;
const RECENCY_CEILING_HOURS: f64 = 100.0;

/// Score an item against the current wall clock. Used at ingestion time.
pub fn score(item: &NewsItem) -> f64 {
    score_at(item, Utc::now())
}

/// Score an item against a fixed clock. Deterministic for a given `now`;
/// the recency component is the only time-dependent input.
pub fn score_at(item: &NewsItem, now: DateTime<Utc>) -> f64 {
    let total = keyword_score(&item.title, item.content.as_deref())
        + engagement_score(item)
        + recency_score(item.published_at, now)
        + source_quality_score(&item.source);
    total.max(0.0)
}

fn keyword_score(title: &str, content: Option<&str>) -> f64 {
    let mut text = title.to_string();
    if let Some(content) = content {
        text.push(' ');
        text.push_str(content);
    }
    let haystack = normalize(&text);

    KEYWORD_CATEGORIES
        .iter()
        .filter(|category| {
            category
                .keywords
                .iter()
                .any(|keyword| contains_word(&haystack, keyword))
        })
        .map(|category| category.weight)
        .sum()
}

fn engagement_score(item: &NewsItem) -> f64 {
    match &item.engagement {
        Some(e) => POINT_WEIGHT * e.points as f64 + COMMENT_WEIGHT * e.comments as f64,
        None => 0.0,
    }
}

fn recency_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - published_at).num_seconds() as f64 / 3600.0;
    (RECENCY_CEILING_HOURS - age_hours).max(0.0)
}

/// Substring match against the normalized tag, so `rss:techcrunch-uk`
/// still matches a `techcrunch` entry. Premium wins over general.
fn source_quality_score(source: &str) -> f64 {
    let tag = source.trim().to_ascii_lowercase();
    if PREMIUM_SOURCES.iter().any(|s| tag.contains(s)) {
        20.0
    } else if GENERAL_SOURCES.iter().any(|s| tag.contains(s)) {
        -10.0
    } else {
        0.0
    }
}

/// Lowercase and split on non-alphanumerics, then rejoin padded with
/// spaces. Keyword lookups match whole words only, so a keyword like
/// "ai" never fires inside "raises".
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_word(haystack: &str, keyword: &str) -> bool {
    haystack.contains(&format!(" {keyword} "))
}
