use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::ProviderConfig;
use crate::db::{Database, PAGE_SIZE, SEARCH_LIMIT, TRENDING_LIMIT};
use crate::error::{FetchError, Result};
use crate::model::{default_author, NewsItem, NewsPage, ALL_CATEGORIES};
use crate::realtime::{Hub, ServerEvent};

const TRENDING_QUERY: &str = "trending OR viral OR breaking";

#[derive(Debug, Default, Deserialize)]
pub struct ProviderSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// An article as the provider sends it. Every field is optional; gaps are
/// resolved during normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderArticle {
    #[serde(default)]
    pub source: Option<ProviderSource>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_to_image: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ProviderPayload {
    pub articles: Vec<ProviderArticle>,
    pub total_results: i64,
}

pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
    provider: ProviderConfig,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>, provider: ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Newswire/1.0 (News Aggregator)")
            .build()?;

        Ok(Self {
            client,
            db,
            provider,
            refreshing: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// One page of a category feed, from the cache when it has anything.
    pub async fn fetch_page(&self, category: &str, page: u32) -> Result<NewsPage> {
        let page = page.max(1);
        match self.db.query_page(category, page).await {
            Ok(cached) if !cached.items.is_empty() => return Ok(cached),
            Ok(_) => {}
            Err(e) => warn!("Cache read failed, falling back to provider: {}", e),
        }

        let api_key = self.api_key()?;
        info!("Fetching '{}' page {} from provider", category, page);

        let mut params = vec![
            ("apiKey", api_key.to_string()),
            ("language", self.provider.language.clone()),
            ("page", page.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if category != ALL_CATEGORIES {
            params.push(("category", category.to_string()));
        }

        let payload = self.request("top-headlines", &params).await?;
        let items = self.normalize_and_store(payload.articles, category, false).await?;

        Ok(NewsPage {
            items,
            total_items: payload.total_results,
            page,
            page_size: PAGE_SIZE,
            has_more: i64::from(page) * i64::from(PAGE_SIZE) < payload.total_results,
        })
    }

    pub async fn fetch_trending(&self) -> Result<NewsPage> {
        match self.db.query_trending().await {
            Ok(cached) if !cached.items.is_empty() => return Ok(cached),
            Ok(_) => {}
            Err(e) => warn!("Cache read failed for trending, falling back to provider: {}", e),
        }

        let api_key = self.api_key()?;
        info!("Fetching trending news from provider");

        let params = [
            ("apiKey", api_key.to_string()),
            ("q", TRENDING_QUERY.to_string()),
            ("language", self.provider.language.clone()),
            ("sortBy", "popularity".to_string()),
            ("pageSize", TRENDING_LIMIT.to_string()),
            ("page", "1".to_string()),
        ];

        let payload = self.request("everything", &params).await?;
        let items = self.normalize_and_store(payload.articles, "trending", true).await?;

        Ok(NewsPage {
            items,
            total_items: payload.total_results,
            page: 1,
            page_size: TRENDING_LIMIT,
            has_more: false,
        })
    }

    pub async fn search(&self, query: &str) -> Result<NewsPage> {
        match self.db.search(query).await {
            Ok(cached) if !cached.items.is_empty() => return Ok(cached),
            Ok(_) => {}
            Err(e) => warn!("Cache search failed, falling back to provider: {}", e),
        }

        let api_key = self.api_key()?;
        info!("Searching provider for '{}'", query);

        let params = [
            ("apiKey", api_key.to_string()),
            ("q", query.to_string()),
            ("language", self.provider.language.clone()),
            ("sortBy", "relevancy".to_string()),
            ("pageSize", SEARCH_LIMIT.to_string()),
            ("page", "1".to_string()),
        ];

        let payload = self.request("everything", &params).await?;
        let items = self.normalize_and_store(payload.articles, "search", false).await?;

        Ok(NewsPage {
            items,
            total_items: payload.total_results,
            page: 1,
            page_size: SEARCH_LIMIT,
            has_more: i64::from(SEARCH_LIMIT) < payload.total_results,
        })
    }

    /// Fetch trending items unless a refresh is already running.
    pub async fn refresh_trending(&self) -> Result<Option<NewsPage>> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Trending refresh already in progress, skipping");
                return Ok(None);
            }
            *refreshing = true;
        }

        let result = self.fetch_trending().await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result.map(Some)
    }

    fn api_key(&self) -> Result<&str> {
        self.provider
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(FetchError::Configuration)
    }

    async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<ProviderPayload> {
        let url = format!("{}/{}", self.provider.base_url.trim_end_matches('/'), endpoint);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Format(format!("body is not JSON: {}", e)))?;
        Self::parse_payload(body)
    }

    async fn normalize_and_store(
        &self,
        articles: Vec<ProviderArticle>,
        category: &str,
        trending: bool,
    ) -> Result<Vec<NewsItem>> {
        let items: Vec<NewsItem> = articles
            .into_iter()
            .filter_map(|article| {
                let item = Self::normalize(article, category, trending);
                if item.id.is_empty() {
                    warn!("Dropping provider article without a URL: '{}'", item.title);
                    return None;
                }
                Some(item)
            })
            .collect();

        let outcome = self.db.upsert_batch(&items).await?;
        info!(
            "Cached {} new items ({} already present, {} skipped)",
            outcome.inserted, outcome.duplicates, outcome.skipped
        );

        Ok(items)
    }

    /// Validate the provider envelope and pull out its articles.
    pub fn parse_payload(mut body: Value) -> Result<ProviderPayload> {
        let articles = match body.get_mut("articles").map(Value::take) {
            Some(Value::Array(articles)) => articles,
            Some(_) => {
                return Err(FetchError::Format(
                    "`articles` is not a sequence".to_string(),
                ))
            }
            None => return Err(FetchError::Format("missing `articles`".to_string())),
        };

        let articles = articles
            .into_iter()
            .map(serde_json::from_value::<ProviderArticle>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| FetchError::Format(format!("malformed article: {}", e)))?;

        let total_results = body
            .get("totalResults")
            .and_then(Value::as_i64)
            .unwrap_or(articles.len() as i64);

        Ok(ProviderPayload {
            articles,
            total_results,
        })
    }

    /// Map a provider article onto the canonical item shape.
    pub fn normalize(article: ProviderArticle, category: &str, trending: bool) -> NewsItem {
        let url = article.url.unwrap_or_default();
        let published_at = article
            .published_at
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let is_breaking = article
            .keywords
            .as_ref()
            .map(|k| k.iter().any(|k| k.eq_ignore_ascii_case("breaking")))
            .unwrap_or(false);

        NewsItem {
            id: url.clone(),
            title: article.title.unwrap_or_default(),
            description: article.description.unwrap_or_default(),
            content: article.content.unwrap_or_default(),
            author: article
                .author
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(default_author),
            source: article.source.and_then(|s| s.name).unwrap_or_default(),
            url,
            image_url: article.url_to_image.unwrap_or_default(),
            published_at,
            category: category.to_string(),
            is_breaking,
            is_trending: trending,
            is_new: false,
        }
    }
}

/// Refresh trending news and push the batch to realtime listeners.
pub async fn publish_trending(fetcher: &Fetcher, hub: &Hub) -> Result<()> {
    if let Some(page) = fetcher.refresh_trending().await? {
        let receivers = hub.publish(ServerEvent::TrendingUpdate(page.items));
        info!("Pushed trending update to {} listeners", receivers);
    }
    Ok(())
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, hub: Hub, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    info!("Starting initial trending fetch");
    if let Err(e) = publish_trending(&fetcher, &hub).await {
        error!("Initial trending fetch failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled trending refresh");
        if let Err(e) = publish_trending(&fetcher, &hub).await {
            error!("Scheduled trending refresh failed: {}", e);
        }
    }
}
