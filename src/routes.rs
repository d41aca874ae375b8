use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::db::{Database, SaveOutcome};
use crate::error::FetchError;
use crate::fetcher::{publish_trending, Fetcher};
use crate::model::{Category, NewsItem, Preferences, User, ALL_CATEGORIES};
use crate::realtime::{self, Hub, ServerEvent};

pub struct AppState {
    pub db: Arc<Database>,
    pub fetcher: Arc<Fetcher>,
    pub hub: Hub,
    pub categories: Vec<Category>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/categories", get(categories))
        .route("/api/news", get(news).post(ingest))
        .route("/api/news/trending", get(trending))
        .route("/api/news/search", get(search))
        .route(
            "/api/users/:id/preferences",
            get(get_preferences).put(put_preferences),
        )
        .route("/api/refresh", post(refresh))
        .route("/api/refresh/status", get(refresh_status))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Custom error type
pub enum AppError {
    Fetch(FetchError),
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Internal(anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Fetch(FetchError::Configuration) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Fetch(FetchError::Format(_)) | AppError::Fetch(FetchError::Transport(_)) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Fetch(FetchError::Cache(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Fetch(e) => e.to_string(),
            AppError::Internal(e) => e.to_string(),
            AppError::BadRequest(m) | AppError::NotFound(m) | AppError::Unprocessable(m) => {
                m.clone()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!("Request failed: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::Fetch(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// Route handlers
pub async fn health() -> impl IntoResponse {
    "OK"
}

pub async fn categories(State(state): State<Arc<AppState>>) -> Json<Vec<Category>> {
    Json(state.categories.clone())
}

fn default_category() -> String {
    ALL_CATEGORIES.to_string()
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.fetcher.fetch_page(&query.category, query.page).await?;
    Ok(Json(page))
}

pub async fn trending(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let page = state.fetcher.fetch_trending().await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(AppError::BadRequest("Search query is required".to_string()));
    }

    let page = state.fetcher.search(q).await?;
    Ok(Json(page))
}

/// Store one item and push it to realtime listeners.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(mut item): Json<NewsItem>,
) -> Result<impl IntoResponse, AppError> {
    if !item.is_storable() {
        return Err(AppError::Unprocessable(
            "Item is missing required fields".to_string(),
        ));
    }
    item.is_new = false;

    let outcome = state.db.save_item(&item).await?;
    let (status, event) = match outcome {
        SaveOutcome::Inserted => (StatusCode::CREATED, ServerEvent::NewsUpdate(item.clone())),
        SaveOutcome::Updated => (StatusCode::OK, ServerEvent::NewsUpdateItem(item.clone())),
    };
    let receivers = state.hub.publish(event);
    info!("Ingested '{}', pushed to {} listeners", item.id, receivers);

    Ok((status, Json(item)))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .db
        .get_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))?;

    Ok(Json(user.preferences))
}

/// Partial preference update; omitted lists are left as they are.
#[derive(Debug, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub categories: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
}

pub async fn put_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let mut user = match state.db.get_user(&user_id).await? {
        Some(user) => user,
        None => User {
            id: user_id.clone(),
            name: user_id.clone(),
            email: String::new(),
            preferences: Preferences::default(),
        },
    };

    if let Some(categories) = update.categories {
        user.preferences.categories = categories;
    }
    if let Some(sources) = update.sources {
        user.preferences.sources = sources;
    }

    state.db.save_user(&user).await?;
    Ok(Json(user.preferences))
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Spawn the refresh task
    let fetcher = state.fetcher.clone();
    let hub = state.hub.clone();
    tokio::spawn(async move {
        if let Err(e) = publish_trending(&fetcher, &hub).await {
            error!("Manual trending refresh failed: {}", e);
        }
    });

    Json(json!({ "refreshing": true }))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let refreshing = state.fetcher.is_refreshing().await;
    Json(json!({ "refreshing": refreshing }))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| realtime::serve_socket(socket, hub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use axum::{body::Body, http::Request};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn create_test_app() -> (Router, Arc<AppState>) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        let db = Arc::new(db);

        let provider = ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            language: "en".to_string(),
        };
        let fetcher = Arc::new(Fetcher::new(db.clone(), provider).unwrap());
        let state = Arc::new(AppState {
            db,
            fetcher,
            hub: Hub::new(),
            categories: crate::model::default_categories(),
        });

        (router(state.clone()), state)
    }

    fn item(id: &str, category: &str, hours_ago: i64) -> NewsItem {
        NewsItem {
            id: id.to_string(),
            title: format!("Article {}", id),
            description: "Summary".to_string(),
            content: String::new(),
            author: "Unknown".to_string(),
            source: "Wire".to_string(),
            url: format!("https://example.com/{}", id),
            image_url: String::new(),
            published_at: Some(Utc::now() - Duration::hours(hours_ago)),
            category: category.to_string(),
            is_breaking: false,
            is_trending: false,
            is_new: false,
        }
    }

    async fn seed(state: &AppState, count: i64) {
        let items: Vec<NewsItem> = (1..=count)
            .map(|i| item(&format!("tech-{}", i), "technology", i))
            .collect();
        state.db.upsert_batch(&items).await.unwrap();
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn send_json(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _state) = create_test_app().await;

            let response = app.oneshot(get_request("/health")).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"OK");
        }
    }

    mod news_tests {
        use super::*;

        #[tokio::test]
        async fn test_categories_lists_defaults() {
            let (app, _state) = create_test_app().await;

            let response = app.oneshot(get_request("/api/categories")).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json.as_array().unwrap().len(), 8);
            assert_eq!(json[0]["slug"], "all");
        }

        #[tokio::test]
        async fn test_news_serves_cached_page() {
            let (app, state) = create_test_app().await;
            seed(&state, 12).await;

            let response = app
                .oneshot(get_request("/api/news?category=technology&page=1"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["items"].as_array().unwrap().len(), 10);
            assert_eq!(json["totalItems"], 12);
            assert_eq!(json["hasMore"], true);
            assert_eq!(json["items"][0]["id"], "tech-1");
        }

        #[tokio::test]
        async fn test_news_cache_miss_without_key_is_unavailable() {
            let (app, _state) = create_test_app().await;

            let response = app.oneshot(get_request("/api/news")).await.unwrap();

            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            let json = body_json(response).await;
            assert_eq!(json["error"], "API key is required");
        }

        #[tokio::test]
        async fn test_trending_from_cache() {
            let (app, state) = create_test_app().await;
            let mut hot = item("hot", "trending", 1);
            hot.is_trending = true;
            state.db.upsert_batch(&[hot]).await.unwrap();

            let response = app.oneshot(get_request("/api/news/trending")).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["items"][0]["id"], "hot");
            assert_eq!(json["items"][0]["isTrending"], true);
        }

        #[tokio::test]
        async fn test_search_requires_query() {
            let (app, _state) = create_test_app().await;

            let response = app.oneshot(get_request("/api/news/search?q=%20")).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_search_matches_cached_title() {
            let (app, state) = create_test_app().await;
            seed(&state, 3).await;

            let response = app
                .oneshot(get_request("/api/news/search?q=article%20tech-2"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["items"].as_array().unwrap().len(), 1);
            assert_eq!(json["items"][0]["id"], "tech-2");
        }
    }

    mod ingest_tests {
        use super::*;

        #[tokio::test]
        async fn test_ingest_new_item_publishes_news_update() {
            let (app, state) = create_test_app().await;
            let mut events = state.hub.subscribe();
            let body = serde_json::to_value(item("fresh", "science", 0)).unwrap();

            let response = app
                .oneshot(send_json("POST", "/api/news", &body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::CREATED);
            match events.recv().await.unwrap() {
                ServerEvent::NewsUpdate(pushed) => assert_eq!(pushed.id, "fresh"),
                other => panic!("unexpected event: {:?}", other),
            }
            assert!(state.db.get_item("fresh").await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_ingest_existing_item_publishes_item_update() {
            let (app, state) = create_test_app().await;
            seed(&state, 1).await;
            let mut events = state.hub.subscribe();
            let mut changed = item("tech-1", "technology", 1);
            changed.title = "Corrected headline".to_string();
            let body = serde_json::to_value(changed).unwrap();

            let response = app
                .oneshot(send_json("POST", "/api/news", &body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            match events.recv().await.unwrap() {
                ServerEvent::NewsUpdateItem(pushed) => {
                    assert_eq!(pushed.title, "Corrected headline")
                }
                other => panic!("unexpected event: {:?}", other),
            }
            let stored = state.db.get_item("tech-1").await.unwrap().unwrap();
            assert_eq!(stored.title, "Corrected headline");
        }

        #[tokio::test]
        async fn test_ingest_rejects_incomplete_item() {
            let (app, state) = create_test_app().await;
            let mut incomplete = item("broken", "science", 0);
            incomplete.url = String::new();
            let body = serde_json::to_value(incomplete).unwrap();

            let response = app
                .oneshot(send_json("POST", "/api/news", &body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            assert!(state.db.get_item("broken").await.unwrap().is_none());
        }
    }

    mod preferences_tests {
        use super::*;

        #[tokio::test]
        async fn test_get_unknown_user_is_not_found() {
            let (app, _state) = create_test_app().await;

            let response = app
                .oneshot(get_request("/api/users/ghost/preferences"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_put_creates_then_partially_updates() {
            let (app, state) = create_test_app().await;

            let response = app
                .clone()
                .oneshot(send_json(
                    "PUT",
                    "/api/users/u1/preferences",
                    &json!({ "categories": ["science"], "sources": ["Wire"] }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let response = app
                .clone()
                .oneshot(send_json(
                    "PUT",
                    "/api/users/u1/preferences",
                    &json!({ "categories": ["health"] }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let response = app
                .oneshot(get_request("/api/users/u1/preferences"))
                .await
                .unwrap();
            let json = body_json(response).await;
            assert_eq!(json["categories"], json!(["health"]));
            assert_eq!(json["sources"], json!(["Wire"]));

            let user = state.db.get_user("u1").await.unwrap().unwrap();
            assert_eq!(user.name, "u1");
        }
    }

    mod refresh_tests {
        use super::*;

        #[tokio::test]
        async fn test_refresh_endpoint() {
            let (app, _state) = create_test_app().await;

            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/refresh")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["refreshing"], true);
        }

        #[tokio::test]
        async fn test_refresh_status_idle() {
            let (app, _state) = create_test_app().await;

            let response = app.oneshot(get_request("/api/refresh/status")).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["refreshing"], false);
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_gateway_error_status_mapping() {
            assert_eq!(
                AppError::Fetch(FetchError::Configuration).status(),
                StatusCode::SERVICE_UNAVAILABLE
            );
            assert_eq!(
                AppError::Fetch(FetchError::Format("no articles".to_string())).status(),
                StatusCode::BAD_GATEWAY
            );
            assert_eq!(
                AppError::Fetch(FetchError::Cache(anyhow::anyhow!("locked"))).status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_news_query_defaults() {
            let query: NewsQuery = serde_urlencoded::from_str("").unwrap();
            assert_eq!(query.category, "all");
            assert_eq!(query.page, 1);
        }

        #[test]
        fn test_news_query_with_values() {
            let query: NewsQuery = serde_urlencoded::from_str("category=sports&page=3").unwrap();
            assert_eq!(query.category, "sports");
            assert_eq!(query.page, 3);
        }

        #[test]
        fn test_search_query_default_is_empty() {
            let query: SearchQuery = serde_urlencoded::from_str("").unwrap();
            assert!(query.q.is_empty());
        }
    }
}
