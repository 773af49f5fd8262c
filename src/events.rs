//! Server-push events and the subscription lifecycle around them.

use crate::adapters::EventSubscriber;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 64;

/// A change notification pushed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, rename = "data", alias = "payload")]
    pub payload: Value,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl BoardEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    /// Project the event concerns, when the payload names one
    pub fn project_id(&self) -> Option<&str> {
        self.payload.get("projectId").and_then(Value::as_str)
    }
}

/// Parameters of a push subscription. Two subscriptions with the same
/// [`signature`](Self::signature) are interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionParams(Map<String, Value>);

impl SubscriptionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Stable JSON form; keys are sorted
    pub fn signature(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// An event matches unless its payload carries one of the subscribed
    /// keys with a different value
    pub fn matches(&self, event: &BoardEvent) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| match event.payload.get(key) {
                Some(actual) => actual == expected,
                None => true,
            })
    }
}

/// How the board derives subscription parameters from the selected project
#[derive(Clone, Default)]
pub enum SseParams {
    /// No push subscription
    Disabled,
    /// `{"projectId": ...}` when a project is selected, `{}` otherwise
    #[default]
    ProjectScoped,
    /// Fixed parameters regardless of project
    Static(SubscriptionParams),
    /// Caller-computed parameters
    Derived(Arc<dyn Fn(Option<&str>) -> SubscriptionParams + Send + Sync>),
}

impl SseParams {
    pub fn resolve(&self, project_id: Option<&str>) -> Option<SubscriptionParams> {
        match self {
            Self::Disabled => None,
            Self::ProjectScoped => Some(match project_id {
                Some(id) => SubscriptionParams::new().with("projectId", id),
                None => SubscriptionParams::new(),
            }),
            Self::Static(params) => Some(params.clone()),
            Self::Derived(derive) => Some((**derive)(project_id)),
        }
    }
}

impl fmt::Debug for SseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::ProjectScoped => write!(f, "ProjectScoped"),
            Self::Static(params) => f.debug_tuple("Static").field(params).finish(),
            Self::Derived(_) => write!(f, "Derived(..)"),
        }
    }
}

/// A live event stream. Dropping it stops the background pump, if any.
pub struct Subscription {
    events: mpsc::Receiver<BoardEvent>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<BoardEvent>) -> Self {
        Self { events, pump: None }
    }

    /// Ties a background task to the subscription's lifetime
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Waits for the next event. `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        self.events.recv().await
    }

    /// Returns a buffered event without waiting
    pub fn try_recv(&mut self) -> Option<BoardEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// In-process event publisher
#[derive(Debug, Clone)]
pub struct LocalEventHub {
    sender: broadcast::Sender<BoardEvent>,
}

impl LocalEventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning how many subscriptions saw it
    pub fn publish(&self, event: BoardEvent) -> usize {
        debug!(event_type = %event.event_type, "publishing board event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalEventHub {
    fn default() -> Self {
        Self::new(EVENT_BUFFER)
    }
}

#[async_trait]
impl EventSubscriber for LocalEventHub {
    async fn subscribe(&self, params: &SubscriptionParams) -> anyhow::Result<Subscription> {
        let mut rx = self.sender.subscribe();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let params = params.clone();

        let pump = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !params.matches(&event) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscription lagged");
                        continue;
                    }
                }
            }
        });

        Ok(Subscription::new(events).with_pump(pump))
    }
}
