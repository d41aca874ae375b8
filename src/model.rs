use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel category slug that disables category filtering.
pub const ALL_CATEGORIES: &str = "all";

/// A single news article in canonical shape.
///
/// `id` is the article identity (provider ID or canonical URL). Every view
/// holding items merges on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_author")]
    pub author: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub image_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub category: String,
    #[serde(default)]
    pub is_breaking: bool,
    #[serde(default)]
    pub is_trending: bool,
    /// Transient highlight, never written to the cache.
    #[serde(default)]
    pub is_new: bool,
}

pub fn default_author() -> String {
    "Unknown".to_string()
}

impl NewsItem {
    /// Whether the item carries every field the cache requires.
    pub fn is_storable(&self) -> bool {
        !self.id.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.source.trim().is_empty()
            && !self.url.trim().is_empty()
            && self.published_at.is_some()
    }
}

/// One page of results, from either the cache or the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPage {
    pub items: Vec<NewsItem>,
    pub total_items: i64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Category {
    fn builtin(slug: &str, name: &str, color: &str, icon: &str) -> Self {
        Self {
            id: slug.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            color: Some(color.to_string()),
            icon: Some(icon.to_string()),
        }
    }
}

/// The static category lookup served when configuration does not override it.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::builtin(ALL_CATEGORIES, "All News", "gray", "globe"),
        Category::builtin("technology", "Technology", "blue", "newspaper"),
        Category::builtin("business", "Business", "green", "briefcase"),
        Category::builtin("sports", "Sports", "orange", "trophy"),
        Category::builtin("politics", "Politics", "red", "building"),
        Category::builtin("entertainment", "Entertainment", "purple", "film"),
        Category::builtin("health", "Health", "emerald", "heart-pulse"),
        Category::builtin("science", "Science", "indigo", "flask"),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub preferences: Preferences,
}
