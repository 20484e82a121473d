//! C9: typed, fan-out, in-process event bus.
//!
//! Subscribers register a handler; `dispatch` invokes every subscriber
//! synchronously under a best-effort contract: a handler that panics is
//! caught and logged, the rest still run. The subscriber list is
//! copy-on-write so dispatch never blocks on a concurrent subscribe.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusType {
    InProgress,
    Success,
    Failed,
}

/// The core event record's tag, including the `Plan`/`Function` subtypes
/// carried over from the UI's original event model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Info,
    Message,
    Action,
    Observation,
    Status,
    Warning,
    Error,
    Plan,
    Function,
}

/// A tagged event. Subtype-specific fields (`tool_name`, `role`, `steps`,
/// ...) live in `data` rather than as separate struct variants, matching
/// the single wire shape every subscriber sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub status: StatusType,
    pub content: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    fn new(event_type: EventType, status: StatusType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            status,
            content: content.into(),
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Reuse an existing event id: for streaming segments where chunks
    /// share identity until the content type switches.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn message(role: &str, content: impl Into<String>, status: StatusType) -> Self {
        Self::new(EventType::Message, status, content).with_data(serde_json::json!({ "role": role }))
    }

    pub fn action(tool_name: &str, tool_args: &serde_json::Value, status: StatusType) -> Self {
        Self::new(EventType::Action, status, format!("calling {tool_name}")).with_data(serde_json::json!({
            "tool_name": tool_name,
            "tool_args": tool_args,
        }))
    }

    pub fn observation(source: &str, content: impl Into<String>) -> Self {
        Self::new(EventType::Observation, StatusType::Success, content)
            .with_data(serde_json::json!({ "source": source }))
    }

    pub fn plan(steps: Vec<String>) -> Self {
        Self::new(EventType::Plan, StatusType::InProgress, steps.join("; "))
            .with_data(serde_json::json!({ "steps": steps }))
    }

    pub fn function_info(name: &str, description: &str, parameters: &serde_json::Value) -> Self {
        Self::new(EventType::Function, StatusType::Success, name).with_data(serde_json::json!({
            "name": name,
            "description": description,
            "parameters": parameters,
        }))
    }

    pub fn status(content: impl Into<String>, status: StatusType) -> Self {
        Self::new(EventType::Status, status, content)
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self::new(EventType::Warning, StatusType::Failed, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(EventType::Error, StatusType::Failed, content)
    }

    pub fn info(content: impl Into<String>) -> Self {
        Self::new(EventType::Info, StatusType::Success, content)
    }
}

pub type Handler = dyn Fn(&Event) + Send + Sync + 'static;

struct Subscription {
    token: u64,
    filter: Option<EventType>,
    handler: Arc<Handler>,
}

/// A handle returned by `subscribe`/`subscribe_to`; dropping it does
/// nothing on its own, call `unsubscribe` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

pub struct EventBus {
    subscribers: ArcSwap<Vec<Subscription>>,
    next_token: AtomicU64,
    debug_sink: Option<Arc<AsyncMutex<DebugSink>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscribers.load().len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Vec::new()),
            next_token: AtomicU64::new(0),
            debug_sink: None,
        }
    }

    /// Enable an append-only NDJSON debug sink at `path`. Intended to be
    /// wired up only when the host's log level is DEBUG.
    pub fn with_debug_sink(path: PathBuf) -> Self {
        let mut bus = Self::new();
        bus.debug_sink = Some(Arc::new(AsyncMutex::new(DebugSink { path })));
        bus
    }

    pub fn subscribe(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionToken {
        self.subscribe_inner(None, Arc::new(handler))
    }

    pub fn subscribe_to(
        &self,
        event_type: EventType,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.subscribe_inner(Some(event_type), Arc::new(handler))
    }

    fn subscribe_inner(&self, filter: Option<EventType>, handler: Arc<Handler>) -> SubscriptionToken {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.subscribers.rcu(|current| {
            let mut next = (**current).clone_boxed();
            next.push(Subscription {
                token,
                filter,
                handler: handler.clone(),
            });
            next
        });
        SubscriptionToken(token)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.rcu(|current| {
            let mut next = (**current).clone_boxed();
            next.retain(|s| s.token != token.0);
            next
        });
    }

    /// Synchronously fan out `event` to every matching subscriber. A
    /// panicking handler is caught and logged; it never prevents other
    /// subscribers from running.
    pub fn dispatch(&self, event: Event) {
        let subscribers = self.subscribers.load();
        for sub in subscribers.iter() {
            if matches!(sub.filter, Some(t) if t != event.event_type) {
                continue;
            }
            let handler = sub.handler.clone();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if result.is_err() {
                error!(token = sub.token, "event bus subscriber panicked, continuing");
            }
        }

        if let Some(sink) = &self.debug_sink {
            let sink = sink.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.lock().await.append(&event).await {
                    warn!(error = %e, "failed to append event to debug sink");
                }
            });
        }
    }
}

trait CloneBoxed {
    fn clone_boxed(&self) -> Vec<Subscription>;
}

impl CloneBoxed for Vec<Subscription> {
    fn clone_boxed(&self) -> Vec<Subscription> {
        self.iter()
            .map(|s| Subscription {
                token: s.token,
                filter: s.filter,
                handler: s.handler.clone(),
            })
            .collect()
    }
}

struct DebugSink {
    path: PathBuf,
}

impl DebugSink {
    async fn append(&self, event: &Event) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event).unwrap_or_default();
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await
    }
}

/// Default debug-sink path: `event_logs/events-<timestamp>.ndjson`, mirroring
/// the host-provided timestamp since this crate may not call `Utc::now()`
/// in contexts the caller wants to keep deterministic.
pub fn default_debug_sink_path(timestamp: DateTime<Utc>) -> PathBuf {
    PathBuf::from("event_logs").join(format!("events-{}.ndjson", timestamp.format("%Y%m%dT%H%M%S")))
}
