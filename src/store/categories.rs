use crate::model::{Category, ALL_CATEGORIES};

use super::slice::AsyncSlice;

const FETCH_CATEGORIES: &str = "fetch_categories";

#[derive(Debug, Clone, PartialEq)]
pub struct Categories {
    pub items: Vec<Category>,
    pub selected: String,
}

impl Default for Categories {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: ALL_CATEGORIES.to_string(),
        }
    }
}

impl Categories {
    pub fn selected_category(&self) -> Option<&Category> {
        self.items.iter().find(|c| c.slug == self.selected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryAction {
    FetchPending,
    FetchFulfilled(Vec<Category>),
    FetchRejected(String),
}

pub type CategoryState = AsyncSlice<Categories>;

impl CategoryState {
    pub fn apply(&mut self, action: CategoryAction) {
        match action {
            CategoryAction::FetchPending => self.begin(FETCH_CATEGORIES),
            CategoryAction::FetchFulfilled(categories) => {
                self.fulfil(FETCH_CATEGORIES, categories, |data, categories| data.items = categories)
            }
            CategoryAction::FetchRejected(message) => self.reject(FETCH_CATEGORIES, message),
        }
    }

    pub fn select(&mut self, slug: impl Into<String>) {
        self.data.selected = slug.into();
    }
}
