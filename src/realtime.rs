//! Realtime push channel.
//!
//! The [`Hub`] fans server events out to every listener. Remote clients
//! attach through [`serve_socket`]; in-process consumers hold a
//! [`ChannelHandle`], which turns inbound events into feed actions and
//! hands them to the store. Delivery is best-effort and at-most-once: a
//! listener that falls behind skips events and nothing is replayed.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::model::NewsItem;
use crate::store::{Dispatcher, FeedAction};

const HUB_CAPACITY: usize = 256;

/// Events pushed from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A newly ingested item.
    NewsUpdate(NewsItem),
    /// A change to an item clients may already hold.
    NewsUpdateItem(NewsItem),
    TrendingUpdate(Vec<NewsItem>),
}

impl ServerEvent {
    fn category(&self) -> Option<&str> {
        match self {
            ServerEvent::NewsUpdate(item) | ServerEvent::NewsUpdateItem(item) => {
                Some(item.category.as_str())
            }
            ServerEvent::TrendingUpdate(_) => None,
        }
    }
}

/// Events sent from clients to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    SubscribeCategory(String),
    UnsubscribeCategory(String),
}

/// Category topics a listener wants item events for.
///
/// An empty set means every category. Trending batches are always delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    categories: HashSet<String>,
}

impl Subscriptions {
    pub fn subscribe(&mut self, category: impl Into<String>) -> bool {
        self.categories.insert(category.into())
    }

    pub fn unsubscribe(&mut self, category: &str) -> bool {
        self.categories.remove(category)
    }

    pub fn apply(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::SubscribeCategory(category) => {
                debug!("Subscribed to category: {}", category);
                self.subscribe(category);
            }
            ClientEvent::UnsubscribeCategory(category) => {
                debug!("Unsubscribed from category: {}", category);
                self.unsubscribe(&category);
            }
        }
    }

    pub fn accepts(&self, event: &ServerEvent) -> bool {
        match event.category() {
            Some(category) => self.categories.is_empty() || self.categories.contains(category),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Hub {
    sender: broadcast::Sender<ServerEvent>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    /// Push an event to every current listener, returning how many there were.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Map an inbound event onto the feed action it triggers, if any.
pub fn route_event(event: ServerEvent) -> Option<FeedAction> {
    match event {
        ServerEvent::NewsUpdate(item) => Some(FeedAction::Upsert(item)),
        ServerEvent::NewsUpdateItem(item) => Some(FeedAction::Update(item)),
        ServerEvent::TrendingUpdate(_) => None,
    }
}

/// An explicitly owned connection to the hub that feeds the store.
pub struct ChannelHandle {
    hub: Hub,
    dispatcher: Dispatcher,
    subscriptions: Arc<RwLock<Subscriptions>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn new(hub: Hub, dispatcher: Dispatcher) -> Self {
        Self {
            hub,
            dispatcher,
            subscriptions: Arc::new(RwLock::new(Subscriptions::default())),
            task: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start receiving events. Events published while disconnected are lost.
    pub fn connect(&mut self) {
        if self.is_connected() {
            return;
        }

        let mut events = self.hub.subscribe();
        let dispatcher = self.dispatcher.clone();
        let subscriptions = self.subscriptions.clone();

        self.task = Some(tokio::spawn(async move {
            info!("Connected to news hub");
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if !subscriptions.read().await.accepts(&event) {
                            continue;
                        }
                        let Some(action) = route_event(event) else {
                            continue;
                        };
                        if dispatcher.dispatch(action).is_err() {
                            warn!("Store closed, dropping realtime connection");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Realtime channel lagged, {} events dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("Disconnected from news hub");
        }));
    }

    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Disconnected from news hub");
        }
    }

    pub async fn subscribe(&self, category: &str) {
        if self.subscriptions.write().await.subscribe(category) {
            info!("Subscribed to category: {}", category);
        }
    }

    pub async fn unsubscribe(&self, category: &str) {
        if self.subscriptions.write().await.unsubscribe(category) {
            info!("Unsubscribed from category: {}", category);
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Pump hub events to one WebSocket client until either side goes away.
pub async fn serve_socket(socket: WebSocket, hub: Hub) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = hub.subscribe();
    let mut subscriptions = Subscriptions::default();

    info!("Realtime client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => subscriptions.apply(event),
                    Err(e) => warn!("Ignoring malformed client message: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Realtime socket error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if !subscriptions.accepts(&event) {
                        continue;
                    }
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode realtime event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Realtime client lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Realtime client disconnected");
}
