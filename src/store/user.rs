use serde::{Deserialize, Serialize};

use crate::model::{Preferences, User};

use super::slice::AsyncSlice;

const FETCH_USER: &str = "fetch_user";
const UPDATE_USER: &str = "update_user";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    pub user: Option<User>,
    pub preferences: Preferences,
    pub theme: Theme,
}

impl UserData {
    fn adopt(&mut self, user: User) {
        self.preferences = user.preferences.clone();
        self.user = Some(user);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    FetchPending,
    FetchFulfilled(User),
    FetchRejected(String),
    UpdatePending,
    UpdateFulfilled(User),
    UpdateRejected(String),
    ToggleCategory(String),
    ToggleSource(String),
    SetTheme(Theme),
}

pub type UserState = AsyncSlice<UserData>;

fn toggle(list: &mut Vec<String>, value: String) {
    match list.iter().position(|v| *v == value) {
        Some(index) => {
            list.remove(index);
        }
        None => list.push(value),
    }
}

impl UserState {
    pub fn apply(&mut self, action: UserAction) {
        match action {
            UserAction::FetchPending => self.begin(FETCH_USER),
            UserAction::FetchFulfilled(user) => self.fulfil(FETCH_USER, user, UserData::adopt),
            UserAction::FetchRejected(message) => self.reject(FETCH_USER, message),
            UserAction::UpdatePending => self.begin(UPDATE_USER),
            UserAction::UpdateFulfilled(user) => self.fulfil(UPDATE_USER, user, UserData::adopt),
            UserAction::UpdateRejected(message) => self.reject(UPDATE_USER, message),
            UserAction::ToggleCategory(category) => {
                toggle(&mut self.data.preferences.categories, category)
            }
            UserAction::ToggleSource(source) => toggle(&mut self.data.preferences.sources, source),
            UserAction::SetTheme(theme) => self.data.theme = theme,
        }
    }
}
