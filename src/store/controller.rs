use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::Database;
use crate::fetcher::Fetcher;
use crate::model::{Category, Preferences, User};

use super::{
    Action, CategoryAction, Dispatcher, FeedAction, RequestToken, RootState, Store, StoreClosed,
    UserAction,
};

/// Drives the gateway on behalf of the store.
///
/// Each operation dispatches a pending action, awaits its I/O and then
/// dispatches exactly one terminal action. It never mutates state itself.
/// Operations return only once their terminal action has been applied, so
/// the snapshot a following call reads already reflects them.
pub struct FeedController {
    fetcher: Arc<Fetcher>,
    db: Arc<Database>,
    categories: Vec<Category>,
    dispatcher: Dispatcher,
    state: watch::Receiver<RootState>,
}

impl FeedController {
    pub fn new(
        store: &Store,
        fetcher: Arc<Fetcher>,
        db: Arc<Database>,
        categories: Vec<Category>,
    ) -> Self {
        Self {
            fetcher,
            db,
            categories,
            dispatcher: store.dispatcher(),
            state: store.state(),
        }
    }

    fn snapshot(&self) -> RootState {
        self.state.borrow().clone()
    }

    pub async fn load_categories(&self) -> Result<(), StoreClosed> {
        self.dispatcher.dispatch(CategoryAction::FetchPending)?;
        self.finish(CategoryAction::FetchFulfilled(self.categories.clone()))
            .await
    }

    /// Re-fetch the page under the current cursor.
    pub async fn refresh_feed(&self) -> Result<(), StoreClosed> {
        let token = self.snapshot().feed.data.current_token();
        self.fetch_page(token).await
    }

    /// Switch category, rewind to page 1 and fetch it.
    pub async fn select_category(&self, slug: &str) -> Result<(), StoreClosed> {
        info!("Selecting category '{}'", slug);
        self.dispatcher
            .dispatch(Action::SelectCategory(slug.to_string()))?;
        self.fetch_page(RequestToken::new(slug, 1)).await
    }

    /// Advance the cursor and fetch the next page. Skipped when the feed is
    /// exhausted or a page fetch is already in flight; trending fetches do
    /// not block it. Reads the snapshot, so actions dispatched by other
    /// callers and not yet applied are not seen.
    pub async fn load_more(&self) -> Result<(), StoreClosed> {
        let feed = self.snapshot().feed;
        if !feed.data.has_more || feed.is_fetching_page() {
            return Ok(());
        }

        let token = RequestToken::new(feed.data.category.clone(), feed.data.page + 1);
        self.dispatcher.dispatch(FeedAction::LoadMore)?;
        self.fetch_page(token).await
    }

    pub async fn refresh_trending(&self) -> Result<(), StoreClosed> {
        self.dispatcher.dispatch(FeedAction::TrendingPending)?;
        let action = match self.fetcher.fetch_trending().await {
            Ok(page) => FeedAction::TrendingFulfilled(page),
            Err(e) => {
                warn!("Trending fetch failed: {}", e);
                FeedAction::TrendingRejected(e.to_string())
            }
        };
        self.finish(action).await
    }

    pub async fn load_user(&self, user_id: &str) -> Result<(), StoreClosed> {
        self.dispatcher.dispatch(UserAction::FetchPending)?;
        let action = match self.db.get_user(user_id).await {
            Ok(Some(user)) => UserAction::FetchFulfilled(user),
            Ok(None) => UserAction::FetchRejected(format!("User '{}' not found", user_id)),
            Err(e) => UserAction::FetchRejected(e.to_string()),
        };
        self.finish(action).await
    }

    /// Persist the preferences currently held in the user slice.
    pub async fn save_preferences(&self) -> Result<(), StoreClosed> {
        let user = self.snapshot().user.data;
        let Some(current) = user.user else {
            return self
                .finish(UserAction::UpdateRejected("No user loaded".to_string()))
                .await;
        };

        self.dispatcher.dispatch(UserAction::UpdatePending)?;
        let updated = User {
            preferences: Preferences {
                categories: user.preferences.categories,
                sources: user.preferences.sources,
            },
            ..current
        };
        let action = match self.db.save_user(&updated).await {
            Ok(()) => UserAction::UpdateFulfilled(updated),
            Err(e) => UserAction::UpdateRejected(e.to_string()),
        };
        self.finish(action).await
    }

    /// Dispatch a terminal action and wait for the store to apply it.
    async fn finish(&self, action: impl Into<Action>) -> Result<(), StoreClosed> {
        self.dispatcher.dispatch(action)?;
        self.dispatcher.flush().await
    }

    async fn fetch_page(&self, token: RequestToken) -> Result<(), StoreClosed> {
        self.dispatcher
            .dispatch(FeedAction::FetchPending(token.clone()))?;

        let action = match self.fetcher.fetch_page(&token.category, token.page).await {
            Ok(page) => FeedAction::FetchFulfilled(token, page),
            Err(e) => {
                warn!(
                    "Fetching page {} of '{}' failed: {}",
                    token.page, token.category, e
                );
                FeedAction::FetchRejected(token, e.to_string())
            }
        };
        self.finish(action).await
    }
}
