//! Event values carried by the scheduler.
//!
//! An [`Event`] pairs a typed [`EventPayload`] with delivery metadata. The
//! concrete [`EventKind`] is derived from the payload variant, so dispatch is
//! a lookup on an explicit tag rather than on runtime type identity. Kinds
//! owned by external collaborators (genetics, disease, economy, narration)
//! travel as [`EventPayload::Custom`] and dispatch on their name.
//!
//! Every event receives a process-wide, strictly increasing sequence number
//! when it is created. It serves as a timestamp and identifies the event in
//! logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use verdant_types::NodeId;

/// Well-known priority levels. Higher runs sooner.
pub mod priority {
    /// Runs before everything else in a drain pass.
    pub const CRITICAL: i32 = 100;
    /// Kernel events such as the tick announcement.
    pub const HIGH: i32 = 50;
    /// Default priority.
    pub const NORMAL: i32 = 0;
    /// Bookkeeping that should observe everything else first.
    pub const LOW: i32 = -50;
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide sequence number.
fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Concrete event kind, the primary dispatch key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new tick has started.
    Tick,
    /// An external request bridged into tick-aligned execution.
    AsyncRequest,
    /// A node was registered with the world.
    NodeAdded,
    /// A node was removed from the world.
    NodeRemoved,
    /// A collaborator-defined kind.
    Custom(String),
}

impl EventKind {
    /// Build a collaborator-defined kind.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Tick => "tick",
            Self::AsyncRequest => "async_request",
            Self::NodeAdded => "node_added",
            Self::NodeRemoved => "node_removed",
            Self::Custom(name) => name,
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse grouping of event kinds for cross-cutting subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Simulated time and orchestration.
    Simulation,
    /// Changes to the environment field.
    Environment,
    /// Node registration and removal.
    Lifecycle,
    /// Bridged request/response traffic.
    Request,
    /// A collaborator-defined category.
    Custom(String),
}

impl EventCategory {
    /// Build a collaborator-defined category.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Simulation => "simulation",
            Self::Environment => "environment",
            Self::Lifecycle => "lifecycle",
            Self::Request => "request",
            Self::Custom(name) => name,
        }
    }
}

impl core::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Environment summary attached to every tick event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEnvironment {
    /// Position of the tick within its day.
    pub time_of_day: u64,
    /// Whether the sun is up.
    pub daytime: bool,
    /// Allocated field chunks at the start of the tick.
    pub active_chunks: usize,
}

/// Payload of [`EventKind::Tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickPayload {
    /// The tick that is starting.
    pub tick: u64,
    /// Ticks elapsed since the previous tick event.
    pub delta: u64,
    /// Environment summary.
    pub environment: TickEnvironment,
}

/// Reply channel of a bridged request.
pub type Reply = Result<serde_json::Value, String>;

/// One-shot reply handle carried by an [`AsyncRequest`].
///
/// Cloning shares the same channel; only the first reply is delivered.
#[derive(Clone, Default)]
pub struct Responder {
    sender: Arc<Mutex<Option<oneshot::Sender<Reply>>>>,
}

impl Responder {
    /// Create a responder and the receiver its reply arrives on.
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Send a successful reply. Returns `false` if a reply was already sent
    /// or the requester stopped waiting.
    pub fn respond(&self, value: serde_json::Value) -> bool {
        self.send(Ok(value))
    }

    /// Send a failure reply. Returns `false` like [`respond`](Self::respond).
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.send(Err(message.into()))
    }

    /// Whether a reply can still be sent.
    pub fn is_pending(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, reply: Reply) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        sender.is_some_and(|tx| tx.send(reply).is_ok())
    }
}

impl core::fmt::Debug for Responder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Responder")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Payload of [`EventKind::AsyncRequest`].
#[derive(Debug, Clone)]
pub struct AsyncRequest {
    /// Identifier assigned by the requester.
    pub request_id: u64,
    /// What is being asked for; subscribers filter on it.
    pub label: String,
    /// Request arguments.
    pub data: serde_json::Value,
    /// Where the answer goes.
    pub responder: Responder,
}

/// Typed event payload. The variant determines the [`EventKind`].
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A new tick has started.
    Tick(TickPayload),
    /// An external request bridged into tick-aligned execution.
    AsyncRequest(AsyncRequest),
    /// A node was registered.
    NodeAdded {
        /// The new node.
        node_id: NodeId,
        /// Its declared type.
        node_type: String,
    },
    /// A node was removed.
    NodeRemoved {
        /// The removed node.
        node_id: NodeId,
    },
    /// A collaborator-defined event.
    Custom {
        /// Kind name used for dispatch.
        kind: String,
        /// Arbitrary structured data.
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// The dispatch kind of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Tick(_) => EventKind::Tick,
            Self::AsyncRequest(_) => EventKind::AsyncRequest,
            Self::NodeAdded { .. } => EventKind::NodeAdded,
            Self::NodeRemoved { .. } => EventKind::NodeRemoved,
            Self::Custom { kind, .. } => EventKind::Custom(kind.clone()),
        }
    }

    /// Category an event with this payload belongs to unless overridden.
    pub const fn default_category(&self) -> EventCategory {
        match self {
            Self::Tick(_) => EventCategory::Simulation,
            Self::AsyncRequest(_) => EventCategory::Request,
            Self::NodeAdded { .. } | Self::NodeRemoved { .. } => EventCategory::Lifecycle,
            Self::Custom { .. } => EventCategory::Simulation,
        }
    }
}

/// A value published onto the scheduler.
#[derive(Debug, Clone)]
pub struct Event {
    payload: EventPayload,
    category: EventCategory,
    priority: i32,
    sequence: u64,
    source: Option<String>,
    also_kinds: Vec<EventKind>,
    also_categories: Vec<EventCategory>,
}

impl Event {
    /// Create an event with [`priority::NORMAL`] and the payload's default
    /// category.
    pub fn new(payload: EventPayload) -> Self {
        let category = payload.default_category();
        Self {
            payload,
            category,
            priority: priority::NORMAL,
            sequence: next_sequence(),
            source: None,
            also_kinds: Vec::new(),
            also_categories: Vec::new(),
        }
    }

    /// Create a collaborator-defined event.
    pub fn custom(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(EventPayload::Custom {
            kind: kind.into(),
            data,
        })
    }

    /// Create the tick announcement, at [`priority::HIGH`].
    pub fn tick(payload: TickPayload) -> Self {
        Self::new(EventPayload::Tick(payload)).with_priority(priority::HIGH)
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Override the category.
    #[must_use]
    pub fn with_category(mut self, category: EventCategory) -> Self {
        self.category = category;
        self
    }

    /// Record the publisher.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Additionally deliver to subscribers of `kind`.
    #[must_use]
    pub fn also_to_kind(mut self, kind: EventKind) -> Self {
        self.also_kinds.push(kind);
        self
    }

    /// Additionally deliver to subscribers of `category`.
    #[must_use]
    pub fn also_to_category(mut self, category: EventCategory) -> Self {
        self.also_categories.push(category);
        self
    }

    /// Dispatch kind derived from the payload.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Category.
    pub const fn category(&self) -> &EventCategory {
        &self.category
    }

    /// Priority; higher is delivered sooner.
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Process-wide creation sequence number.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Publisher identifier, if one was recorded.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The payload.
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Tick payload, if this is a tick event.
    pub const fn as_tick(&self) -> Option<&TickPayload> {
        match &self.payload {
            EventPayload::Tick(payload) => Some(payload),
            _ => None,
        }
    }

    /// Request payload, if this is a bridged request.
    pub const fn as_request(&self) -> Option<&AsyncRequest> {
        match &self.payload {
            EventPayload::AsyncRequest(request) => Some(request),
            _ => None,
        }
    }

    /// Custom data, if this is a collaborator-defined event.
    pub const fn custom_data(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            EventPayload::Custom { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Kinds to deliver to: the own kind first, then fan-out kinds, without
    /// duplicates.
    pub fn delivery_kinds(&self) -> Vec<EventKind> {
        let mut kinds = vec![self.kind()];
        for kind in &self.also_kinds {
            if !kinds.contains(kind) {
                kinds.push(kind.clone());
            }
        }
        kinds
    }

    /// Categories to deliver to: the own category first, then fan-out
    /// categories, without duplicates.
    pub fn delivery_categories(&self) -> Vec<EventCategory> {
        let mut categories = vec![self.category.clone()];
        for category in &self.also_categories {
            if !categories.contains(category) {
                categories.push(category.clone());
            }
        }
        categories
    }
}
