use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::error::Error;

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sources", get(list_sources))
        .route("/feed", get(feed))
        .route("/refresh", post(refresh))
        .route("/search", get(search))
        .route("/feeds", post(add_feed))
        .route("/feeds/:name", delete(remove_feed))
        .route("/health", get(health))
        .with_state(state)
}

/// Maps the core error taxonomy onto HTTP statuses: user-correctable
/// conditions get 4xx, everything else is a 500.
pub struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateFeed(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody {
            error: self.0.to_string(),
        }))
            .into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub source: Option<String>,
    pub limit: Option<i64>,
    pub hours: Option<i64>,
}

pub async fn feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let items = state
        .aggregator
        .get_feed(query.source.as_deref(), query.limit, query.hours)
        .await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
pub struct RefreshQuery {
    pub source: Option<String>,
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefreshQuery>,
) -> Result<impl IntoResponse, AppError> {
    let outcomes = state.aggregator.refresh(query.source.as_deref()).await?;
    Ok(Json(outcomes))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let items = state.aggregator.search(&query.q, query.limit).await?;
    Ok(Json(items))
}

pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state.aggregator.list_sources().await?;
    Ok(Json(listing))
}

#[derive(Deserialize)]
pub struct AddFeedRequest {
    pub name: String,
    pub url: String,
}

pub async fn add_feed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddFeedRequest>,
) -> Result<impl IntoResponse, AppError> {
    let feed = state.aggregator.add_feed(&request.name, &request.url).await?;
    Ok((StatusCode::CREATED, Json(feed)))
}

#[derive(Serialize)]
struct RemoveResponse {
    removed: bool,
}

pub async fn remove_feed(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let removed = state.aggregator.remove_feed(&name).await?;
    let status = if removed {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(RemoveResponse { removed })).into_response())
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FeedRegistry};
    use crate::db::Database;
    use crate::fetcher::Fetcher;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    async fn create_test_app() -> (Router, Arc<Database>, NamedTempFile) {
        let config_file = NamedTempFile::new().unwrap();
        let config = Config::from_str("").unwrap();
        config.save(config_file.path()).unwrap();

        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.initialize().await.unwrap();

        let fetcher = Arc::new(Fetcher::new());
        let registry = Arc::new(FeedRegistry::new(config_file.path(), config.clone()));
        let aggregator = Arc::new(Aggregator::new(db.clone(), fetcher, registry, &config));

        let app = router(Arc::new(AppState { aggregator }));
        (app, db, config_file)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    mod feed_tests {
        use super::*;
        use crate::db::NewsItem;
        use chrono::Utc;

        #[tokio::test]
        async fn test_feed_returns_json_items() {
            let (app, db, _cfg) = create_test_app().await;
            let now = Utc::now();
            db.upsert_item(&NewsItem {
                id: "hackernews:1".to_string(),
                source: "hackernews".to_string(),
                title: "A story".to_string(),
                url: "https://example.com/1".to_string(),
                content: None,
                author: None,
                engagement: None,
                published_at: now,
                cached_at: now,
                rank_score: 42.0,
            })
            .await
            .unwrap();

            let response = app
                .oneshot(Request::builder().uri("/feed").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json.as_array().unwrap().len(), 1);
            assert_eq!(json[0]["title"], "A story");
            assert_eq!(json[0]["rank_score"], 42.0);
        }

        #[tokio::test]
        async fn test_feed_rejects_bad_limit() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/feed?limit=0")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    mod search_tests {
        use super::*;

        #[tokio::test]
        async fn test_search_rejects_blank_query() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/search?q=%20")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    mod registration_tests {
        use super::*;

        fn add_feed_request(name: &str, url: &str) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri("/feeds")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "name": name, "url": url }).to_string(),
                ))
                .unwrap()
        }

        #[tokio::test]
        async fn test_add_feed_created() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .oneshot(add_feed_request("blog", "https://blog.example.com/feed"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::CREATED);
            let json = body_json(response).await;
            assert_eq!(json["name"], "blog");
        }

        #[tokio::test]
        async fn test_add_duplicate_feed_conflicts() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .clone()
                .oneshot(add_feed_request("blog", "https://blog.example.com/feed"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);

            let response = app
                .oneshot(add_feed_request("blog2", "https://blog.example.com/feed"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CONFLICT);
        }

        #[tokio::test]
        async fn test_remove_missing_feed_is_not_found() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri("/feeds/nope")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let json = body_json(response).await;
            assert_eq!(json["removed"], false);
        }
    }

    mod sources_tests {
        use super::*;

        #[tokio::test]
        async fn test_sources_lists_builtin_tracker() {
            let (app, _db, _cfg) = create_test_app().await;

            let response = app
                .oneshot(Request::builder().uri("/sources").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["configured"][0]["tag"], "hackernews");
            assert!(json["cached"].as_array().unwrap().is_empty());
        }
    }

    mod query_struct_tests {
        use super::*;

        #[test]
        fn test_feed_query_defaults() {
            let query: FeedQuery = serde_urlencoded::from_str("").unwrap();
            assert!(query.source.is_none());
            assert!(query.limit.is_none());
            assert!(query.hours.is_none());
        }

        #[test]
        fn test_feed_query_with_values() {
            let query: FeedQuery =
                serde_urlencoded::from_str("source=hackernews&limit=10&hours=24").unwrap();
            assert_eq!(query.source.as_deref(), Some("hackernews"));
            assert_eq!(query.limit, Some(10));
            assert_eq!(query.hours, Some(24));
        }
    }
}
