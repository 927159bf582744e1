use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::Result;

pub const DEFAULT_SEARCH_LIMIT: i64 = 50;

/// Engagement metrics for sources that expose them (points and
/// discussion counts). Absent entirely for plain RSS feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Engagement {
    pub points: u32,
    pub comments: u32,
}

/// One normalized piece of content from any source.
///
/// `id` is derived from `(source, upstream identifier)` and is the
/// idempotency key: re-ingesting the same upstream item replaces every
/// other field and recomputes `rank_score`, never duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub engagement: Option<Engagement>,
    pub published_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
    pub rank_score: f64,
}

impl FromRow<'_, SqliteRow> for NewsItem {
    fn from_row(row: &SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let points: Option<i64> = row.try_get("points")?;
        let comments: Option<i64> = row.try_get("comments")?;
        let engagement = match (points, comments) {
            (None, None) => None,
            (points, comments) => Some(Engagement {
                points: points.unwrap_or(0).max(0) as u32,
                comments: comments.unwrap_or(0).max(0) as u32,
            }),
        };

        Ok(Self {
            id: row.try_get("id")?,
            source: row.try_get("source")?,
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            content: row.try_get("content")?,
            author: row.try_get("author")?,
            engagement,
            published_at: parse_timestamp(row, "published_at")?,
            cached_at: parse_timestamp(row, "cached_at")?,
            rank_score: row.try_get("rank_score")?,
        })
    }
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

/// Conjunction of optional predicates for [`Database::query_items`].
/// An empty filter means "all items".
#[derive(Debug, Default, Clone)]
pub struct ItemFilter {
    pub source: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

const UPSERT_SQL: &str = r#"
    INSERT INTO news_items
        (id, source, title, url, content, author, points, comments,
         published_at, cached_at, rank_score)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        source = excluded.source,
        title = excluded.title,
        url = excluded.url,
        content = excluded.content,
        author = excluded.author,
        points = excluded.points,
        comments = excluded.comments,
        published_at = excluded.published_at,
        cached_at = excluded.cached_at,
        rank_score = excluded.rank_score
"#;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_items (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                content TEXT,
                author TEXT,
                points INTEGER,
                comments INTEGER,
                published_at TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                rank_score REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_items_source
            ON news_items(source)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_items_rank
            ON news_items(rank_score DESC, published_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or fully replace the record with matching `id`.
    pub async fn upsert_item(&self, item: &NewsItem) -> Result<()> {
        bind_upsert(item).execute(&self.pool).await?;
        Ok(())
    }

    /// Apply a batch of upserts as one transaction, so a refresh either
    /// fully lands or fully fails without partial visibility.
    pub async fn upsert_batch(&self, items: &[NewsItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            bind_upsert(item).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Filtered retrieval, ordered by `rank_score` descending, then
    /// `published_at` descending, then insertion order.
    pub async fn query_items(&self, filter: &ItemFilter) -> Result<Vec<NewsItem>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM news_items WHERE 1 = 1");

        if let Some(source) = &filter.source {
            qb.push(" AND source = ");
            qb.push_bind(source.clone());
        }
        if let Some(after) = filter.published_after {
            qb.push(" AND published_at >= ");
            qb.push_bind(after.to_rfc3339());
        }
        qb.push(" ORDER BY rank_score DESC, published_at DESC, rowid ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let items = qb.build_query_as::<NewsItem>().fetch_all(&self.pool).await?;
        Ok(items)
    }

    /// Substring match against title or content. SQLite's LIKE is
    /// ASCII-case-insensitive; `%` and `_` in the needle are escaped so
    /// they match literally.
    pub async fn search_items(&self, needle: &str, limit: Option<i64>) -> Result<Vec<NewsItem>> {
        let pattern = format!("%{}%", escape_like(needle));
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let items = sqlx::query_as::<_, NewsItem>(
            r#"
            SELECT * FROM news_items
            WHERE title LIKE ?1 ESCAPE '\' OR content LIKE ?1 ESCAPE '\'
            ORDER BY rank_score DESC, published_at DESC, rowid ASC
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Distinct `source` tags currently present in the cache.
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        let sources =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT source FROM news_items ORDER BY source")
                .fetch_all(&self.pool)
                .await?;
        Ok(sources)
    }

    /// Delete every record whose `cached_at` is older than `days` days.
    /// Keyed off ingestion time, not `published_at`. Returns the count
    /// deleted. This is the only deletion path.
    pub async fn evict_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let result = sqlx::query("DELETE FROM news_items WHERE cached_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Close the pool, flushing pending writes. Called on orderly shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_upsert(
    item: &NewsItem,
) -> sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(UPSERT_SQL)
        .bind(&item.id)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.content)
        .bind(&item.author)
        .bind(item.engagement.as_ref().map(|e| e.points as i64))
        .bind(item.engagement.as_ref().map(|e| e.comments as i64))
        .bind(item.published_at.to_rfc3339())
        .bind(item.cached_at.to_rfc3339())
        .bind(item.rank_score)
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
