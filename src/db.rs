use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::model::{NewsItem, NewsPage, Preferences, User, ALL_CATEGORIES};

pub const PAGE_SIZE: u32 = 10;
pub const TRENDING_LIMIT: u32 = 20;
pub const SEARCH_LIMIT: u32 = 10;

const NEWS_COLUMNS: &str = "article_id, title, description, content, author, source, url, \
     image_url, published_at, category, is_breaking, is_trending";

#[derive(Debug, Clone, FromRow)]
struct NewsRow {
    article_id: String,
    title: String,
    description: String,
    content: String,
    author: String,
    source: String,
    url: String,
    image_url: String,
    published_at: String,
    category: String,
    is_breaking: bool,
    is_trending: bool,
}

impl From<NewsRow> for NewsItem {
    fn from(row: NewsRow) -> Self {
        let published_at = DateTime::parse_from_rfc3339(&row.published_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));

        NewsItem {
            id: row.article_id,
            title: row.title,
            description: row.description,
            content: row.content,
            author: row.author,
            source: row.source,
            url: row.url,
            image_url: row.image_url,
            published_at,
            category: row.category,
            is_breaking: row.is_breaking,
            is_trending: row.is_trending,
            is_new: false,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    categories: String,
    sources: String,
}

/// Result of writing a batch of items to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    /// Items whose identity was already cached.
    pub duplicates: usize,
    /// Items dropped for missing required fields.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY,
                article_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT 'Unknown',
                source TEXT NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT NOT NULL DEFAULT '',
                published_at TEXT NOT NULL,
                category TEXT NOT NULL,
                is_breaking INTEGER NOT NULL DEFAULT 0,
                is_trending INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_news_published ON news(published_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_news_category ON news(category)",
            "CREATE INDEX IF NOT EXISTS idx_news_trending ON news(is_trending, published_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_news_breaking ON news(is_breaking, published_at DESC)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                categories TEXT NOT NULL DEFAULT '[]',
                sources TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a batch, keeping going past duplicates and invalid items.
    ///
    /// Duplicate identities count as already present. Any other write
    /// failure aborts the remainder of the batch and is returned.
    pub async fn upsert_batch(&self, items: &[NewsItem]) -> anyhow::Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for item in items {
            if !item.is_storable() {
                warn!("Skipping invalid news item '{}' ({})", item.title, item.id);
                outcome.skipped += 1;
                continue;
            }

            match self.insert_item(item).await {
                Ok(()) => outcome.inserted += 1,
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    outcome.duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if outcome.duplicates > 0 {
            debug!(
                "{} news items already cached, skipped duplicates",
                outcome.duplicates
            );
        }

        Ok(outcome)
    }

    async fn insert_item(&self, item: &NewsItem) -> Result<(), sqlx::Error> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO news (article_id, title, description, content, author, source, url,
                              image_url, published_at, category, is_breaking, is_trending,
                              created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.content)
        .bind(&item.author)
        .bind(&item.source)
        .bind(&item.url)
        .bind(&item.image_url)
        .bind(item.published_at.map(format_timestamp))
        .bind(&item.category)
        .bind(item.is_breaking)
        .bind(item.is_trending)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace a single item by identity.
    pub async fn save_item(&self, item: &NewsItem) -> anyhow::Result<SaveOutcome> {
        if !item.is_storable() {
            anyhow::bail!("news item '{}' is missing required fields", item.id);
        }

        let now = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news WHERE article_id = ?")
            .bind(&item.id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO news (article_id, title, description, content, author, source, url,
                              image_url, published_at, category, is_breaking, is_trending,
                              created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(article_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                content = excluded.content,
                author = excluded.author,
                source = excluded.source,
                url = excluded.url,
                image_url = excluded.image_url,
                published_at = excluded.published_at,
                category = excluded.category,
                is_breaking = excluded.is_breaking,
                is_trending = excluded.is_trending,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.content)
        .bind(&item.author)
        .bind(&item.source)
        .bind(&item.url)
        .bind(&item.image_url)
        .bind(item.published_at.map(format_timestamp))
        .bind(&item.category)
        .bind(item.is_breaking)
        .bind(item.is_trending)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if existing > 0 {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Inserted
        })
    }

    pub async fn get_item(&self, article_id: &str) -> anyhow::Result<Option<NewsItem>> {
        let row = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM news WHERE article_id = ?"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(NewsItem::from))
    }

    /// One page of cached items, newest first. `all` disables the category filter.
    pub async fn query_page(&self, category: &str, page: u32) -> anyhow::Result<NewsPage> {
        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(PAGE_SIZE);

        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            r#"
            SELECT {NEWS_COLUMNS} FROM news
            WHERE ? = ? OR category = ?
            ORDER BY published_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(category)
        .bind(ALL_CATEGORIES)
        .bind(category)
        .bind(i64::from(PAGE_SIZE))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM news WHERE ? = ? OR category = ?")
                .bind(category)
                .bind(ALL_CATEGORIES)
                .bind(category)
                .fetch_one(&self.pool)
                .await?;

        Ok(NewsPage {
            items: rows.into_iter().map(NewsItem::from).collect(),
            total_items: total,
            page,
            page_size: PAGE_SIZE,
            has_more: i64::from(page) * i64::from(PAGE_SIZE) < total,
        })
    }

    pub async fn query_trending(&self) -> anyhow::Result<NewsPage> {
        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            r#"
            SELECT {NEWS_COLUMNS} FROM news
            WHERE is_trending = 1
            ORDER BY published_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(i64::from(TRENDING_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<NewsItem> = rows.into_iter().map(NewsItem::from).collect();
        Ok(NewsPage {
            total_items: items.len() as i64,
            items,
            page: 1,
            page_size: TRENDING_LIMIT,
            has_more: false,
        })
    }

    /// Case-insensitive substring match over title, description and content.
    pub async fn search(&self, query: &str) -> anyhow::Result<NewsPage> {
        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            r#"
            SELECT {NEWS_COLUMNS} FROM news
            WHERE instr(lower(title), lower(?)) > 0
               OR instr(lower(description), lower(?)) > 0
               OR instr(lower(content), lower(?)) > 0
            ORDER BY published_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(query)
        .bind(query)
        .bind(query)
        .bind(i64::from(SEARCH_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<NewsItem> = rows.into_iter().map(NewsItem::from).collect();
        Ok(NewsPage {
            total_items: items.len() as i64,
            items,
            page: 1,
            page_size: SEARCH_LIMIT,
            has_more: false,
        })
    }

    pub async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> anyhow::Result<User> {
            Ok(User {
                id: row.id,
                name: row.name,
                email: row.email,
                preferences: Preferences {
                    categories: serde_json::from_str(&row.categories)?,
                    sources: serde_json::from_str(&row.sources)?,
                },
            })
        })
        .transpose()
    }

    pub async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        let categories = serde_json::to_string(&user.preferences.categories)?;
        let sources = serde_json::to_string(&user.preferences.sources)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, categories, sources)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                categories = excluded.categories,
                sources = excluded.sources
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(categories)
        .bind(sources)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
