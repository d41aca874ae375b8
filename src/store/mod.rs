//! Client-side application state.
//!
//! A single task owns [`RootState`] and applies [`Action`]s one at a time,
//! in the order they were dispatched. Readers see immutable snapshots through
//! a watch channel. Async work never touches state directly; it dispatches a
//! pending action and then exactly one terminal action.

mod categories;
mod controller;
mod feed;
mod slice;
mod user;

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::debug;

pub use categories::{Categories, CategoryAction, CategoryState};
pub use controller::FeedController;
pub use feed::{
    BoundedRing, Feed, FeedAction, FeedState, RequestToken, TOP_STORIES_CAPACITY,
    TRENDING_CAPACITY, TRENDING_VISIBLE,
};
pub use slice::AsyncSlice;
pub use user::{Theme, UserAction, UserData, UserState};

/// How long realtime and freshly fetched items stay highlighted.
pub const CLEAR_NEW_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Feed(FeedAction),
    Categories(CategoryAction),
    User(UserAction),
    /// Select a category and rewind the feed cursor in one step.
    SelectCategory(String),
}

impl From<FeedAction> for Action {
    fn from(action: FeedAction) -> Self {
        Action::Feed(action)
    }
}

impl From<CategoryAction> for Action {
    fn from(action: CategoryAction) -> Self {
        Action::Categories(action)
    }
}

impl From<UserAction> for Action {
    fn from(action: UserAction) -> Self {
        Action::User(action)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootState {
    pub feed: FeedState,
    pub categories: CategoryState,
    pub user: UserState,
}

impl RootState {
    /// Apply one action. Returns whether the feed's items changed.
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::Feed(action) => self.feed.apply(action),
            Action::Categories(action) => {
                self.categories.apply(action);
                false
            }
            Action::User(action) => {
                self.user.apply(action);
                false
            }
            Action::SelectCategory(slug) => {
                self.categories.select(slug.clone());
                self.feed.select_category(slug);
                false
            }
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("store is no longer running")]
pub struct StoreClosed;

#[derive(Debug)]
enum Envelope {
    Apply(Action),
    /// Acknowledged once every earlier envelope has been applied.
    Flush(oneshot::Sender<()>),
}

/// Cloneable send side of the store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl Dispatcher {
    pub fn dispatch(&self, action: impl Into<Action>) -> Result<(), StoreClosed> {
        self.sender
            .send(Envelope::Apply(action.into()))
            .map_err(|_| StoreClosed)
    }

    /// Wait until every action dispatched before this call is visible in
    /// the state snapshot.
    pub async fn flush(&self) -> Result<(), StoreClosed> {
        let (ack, applied) = oneshot::channel();
        self.sender
            .send(Envelope::Flush(ack))
            .map_err(|_| StoreClosed)?;
        applied.await.map_err(|_| StoreClosed)
    }
}

pub struct Store {
    dispatcher: Dispatcher,
    state: watch::Receiver<RootState>,
}

impl Store {
    /// Start the reducer task. It stops once every dispatcher is dropped.
    pub fn spawn() -> Self {
        let (sender, envelopes) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(RootState::default());

        tokio::spawn(run(envelopes, state_tx));

        Self {
            dispatcher: Dispatcher { sender },
            state,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn dispatch(&self, action: impl Into<Action>) -> Result<(), StoreClosed> {
        self.dispatcher.dispatch(action)
    }

    pub fn state(&self) -> watch::Receiver<RootState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> RootState {
        self.state.borrow().clone()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(mut envelopes: mpsc::UnboundedReceiver<Envelope>, state: watch::Sender<RootState>) {
    // Debounced: every change to the feed items pushes the deadline back.
    let mut clear_at: Option<Instant> = None;

    loop {
        let action = tokio::select! {
            envelope = envelopes.recv() => match envelope {
                Some(Envelope::Apply(action)) => action,
                Some(Envelope::Flush(ack)) => {
                    let _ = ack.send(());
                    continue;
                }
                None => break,
            },
            _ = sleep_until(clear_at) => {
                clear_at = None;
                Action::Feed(FeedAction::ClearNewIndicators)
            }
        };

        let mut items_changed = false;
        state.send_modify(|root| items_changed = root.apply(action));

        if items_changed {
            clear_at = Some(Instant::now() + CLEAR_NEW_DELAY);
        }
    }

    debug!("Store stopped");
}
