//! The news feed reducer.
//!
//! All merge rules match on item identity. Results of page fetches carry a
//! [`RequestToken`] and are dropped when the feed has since moved to another
//! category or cursor.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{NewsItem, NewsPage, ALL_CATEGORIES};

use super::slice::AsyncSlice;

pub const TOP_STORIES_CAPACITY: usize = 5;
pub const TRENDING_CAPACITY: usize = 10;
/// How many trending entries a sidebar shows.
pub const TRENDING_VISIBLE: usize = 5;

const FETCH_PAGE: &str = "fetch_page";
const FETCH_TRENDING: &str = "fetch_trending";

/// Fixed-capacity view, newest at the front.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedRing {
    items: Vec<NewsItem>,
    capacity: usize,
}

impl BoundedRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn items(&self) -> &[NewsItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the entry with the same id in place, or insert at the front and
    /// evict from the tail past capacity.
    pub fn upsert_front(&mut self, item: NewsItem) {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(slot) => *slot = item,
            None => {
                self.items.insert(0, item);
                self.items.truncate(self.capacity);
            }
        }
    }

    pub fn replace_all(&mut self, items: impl IntoIterator<Item = NewsItem>) {
        self.items = items.into_iter().take(self.capacity).collect();
    }
}

/// The category and cursor a page fetch was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub category: String,
    pub page: u32,
}

impl RequestToken {
    pub fn new(category: impl Into<String>, page: u32) -> Self {
        Self {
            category: category.into(),
            page,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub items: Vec<NewsItem>,
    pub top_stories: BoundedRing,
    pub trending: BoundedRing,
    pub has_more: bool,
    pub page: u32,
    pub category: String,
    in_flight: Option<RequestToken>,
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            top_stories: BoundedRing::new(TOP_STORIES_CAPACITY),
            trending: BoundedRing::new(TRENDING_CAPACITY),
            has_more: true,
            page: 1,
            category: ALL_CATEGORIES.to_string(),
            in_flight: None,
        }
    }
}

impl Feed {
    /// The token a page fetch issued right now would carry.
    pub fn current_token(&self) -> RequestToken {
        RequestToken::new(self.category.clone(), self.page)
    }

    pub fn visible_trending(&self) -> &[NewsItem] {
        let trending = self.trending.items();
        &trending[..trending.len().min(TRENDING_VISIBLE)]
    }

    fn merge_page(&mut self, page: NewsPage) {
        if self.page == 1 {
            self.items = page.items;
            if self.top_stories.is_empty() {
                self.top_stories.replace_all(
                    self.items
                        .iter()
                        .filter(|item| item.is_breaking)
                        .take(TOP_STORIES_CAPACITY)
                        .cloned(),
                );
            }
        } else {
            let mut seen: HashSet<String> =
                self.items.iter().map(|item| item.id.clone()).collect();
            let fresh: Vec<NewsItem> = page
                .items
                .into_iter()
                .filter(|new| seen.insert(new.id.clone()))
                .collect();
            self.items.extend(fresh);
        }
        self.has_more = page.has_more;
    }

    fn upsert(&mut self, mut item: NewsItem) {
        item.is_new = true;

        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(slot) => *slot = item.clone(),
            None => self.items.insert(0, item.clone()),
        }

        if item.is_breaking {
            self.top_stories.upsert_front(item.clone());
        }
        if item.is_trending {
            self.trending.upsert_front(item);
        }
    }

    fn update(&mut self, mut item: NewsItem) -> bool {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(slot) => {
                item.is_new = true;
                *slot = item;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedAction {
    FetchPending(RequestToken),
    FetchFulfilled(RequestToken, NewsPage),
    FetchRejected(RequestToken, String),
    TrendingPending,
    TrendingFulfilled(NewsPage),
    TrendingRejected(String),
    LoadMore,
    Upsert(NewsItem),
    Update(NewsItem),
    ClearNewIndicators,
    Reset,
}

pub type FeedState = AsyncSlice<Feed>;

impl FeedState {
    /// Apply one action. Returns whether the feed's items changed.
    pub fn apply(&mut self, action: FeedAction) -> bool {
        match action {
            FeedAction::FetchPending(token) => {
                self.begin(FETCH_PAGE);
                self.data.in_flight = Some(token);
                false
            }
            FeedAction::FetchFulfilled(token, page) => {
                if !self.accept_result(&token) {
                    return false;
                }
                self.fulfil(FETCH_PAGE, page, Feed::merge_page);
                true
            }
            FeedAction::FetchRejected(token, message) => {
                if self.accept_result(&token) {
                    self.reject(FETCH_PAGE, message);
                }
                false
            }
            FeedAction::TrendingPending => {
                self.begin(FETCH_TRENDING);
                false
            }
            FeedAction::TrendingFulfilled(page) => {
                self.fulfil(FETCH_TRENDING, page, |feed, page| {
                    feed.trending.replace_all(page.items)
                });
                false
            }
            FeedAction::TrendingRejected(message) => {
                self.reject(FETCH_TRENDING, message);
                false
            }
            FeedAction::LoadMore => {
                self.data.page += 1;
                false
            }
            FeedAction::Upsert(item) => {
                self.data.upsert(item);
                true
            }
            FeedAction::Update(item) => self.data.update(item),
            FeedAction::ClearNewIndicators => {
                for item in &mut self.data.items {
                    item.is_new = false;
                }
                false
            }
            FeedAction::Reset => {
                *self = FeedState::default();
                false
            }
        }
    }

    /// Whether a page fetch is in flight, regardless of trending fetches.
    pub fn is_fetching_page(&self) -> bool {
        self.is_loading_op(FETCH_PAGE)
    }

    /// Switch category and rewind the cursor before the next fetch. Only
    /// reachable through the root category switch, which keeps the
    /// categories slice in step.
    pub(super) fn select_category(&mut self, category: String) {
        self.data.category = category;
        self.data.page = 1;
        self.data.has_more = true;
    }

    /// Whether a settled page fetch still belongs to the current context.
    fn accept_result(&mut self, token: &RequestToken) -> bool {
        let was_in_flight = self.data.in_flight.as_ref() == Some(token);
        if was_in_flight {
            self.data.in_flight = None;
        }

        if *token == self.data.current_token() {
            return true;
        }

        debug!(
            "Discarding stale page {} for '{}' (now page {} of '{}')",
            token.page, token.category, self.data.page, self.data.category
        );
        if was_in_flight {
            self.settle(FETCH_PAGE);
        }
        false
    }
}
