//! Priority-ordered publish/subscribe scheduler.
//!
//! Events are buffered by [`Scheduler::publish`] and delivered by
//! [`Scheduler::drain`]. A drain swaps the pending buffer for an empty one and
//! delivers only what it took, so anything published while handlers run waits
//! for the next drain. Within a pass events go out by descending priority,
//! ties in publish order.
//!
//! For each event the scheduler runs the handlers registered for the event's
//! own kind, then those of its fan-out kinds, then those of its own category,
//! then those of its fan-out categories. Handlers are awaited one at a
//! time. A handler that returns an error, panics, or overruns the configured
//! timeout is logged and counted, and delivery moves on.
//!
//! Locks guarding the buffer and the registry are released before any
//! handler is awaited, so handlers may publish, subscribe and unsubscribe.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DeliveryFailure, HandlerError};
use crate::event::{Event, EventCategory, EventKind};

/// Default per-handler time budget.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed handler callback.
pub type Handler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Boxed subscription filter.
pub type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Scheduler tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Per-handler time budget. `None` lets handlers run unbounded.
    pub handler_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Some(DEFAULT_HANDLER_TIMEOUT),
        }
    }
}

/// Handle returned by the subscribe methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one [`Scheduler::drain`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Events taken from the pending buffer.
    pub events: usize,
    /// Handler invocations that ran to completion successfully.
    pub delivered: usize,
    /// Handler invocations skipped because their filter rejected the event.
    pub filtered: usize,
    /// Handler invocations that errored, panicked or timed out.
    pub failures: usize,
    /// The call found another drain in progress and did nothing.
    pub skipped: bool,
}

impl DrainReport {
    const fn skipped_pass() -> Self {
        Self {
            events: 0,
            delivered: 0,
            filtered: 0,
            failures: 0,
            skipped: true,
        }
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Handler,
    filter: Option<Filter>,
}

#[derive(Default)]
struct Registry {
    by_kind: HashMap<EventKind, Vec<Subscription>>,
    by_category: HashMap<EventCategory, Vec<Subscription>>,
}

impl Registry {
    fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for list in self.by_kind.values_mut().chain(self.by_category.values_mut()) {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
        }
        self.by_kind.retain(|_, list| !list.is_empty());
        self.by_category.retain(|_, list| !list.is_empty());
        removed
    }

    fn len(&self) -> usize {
        self.by_kind
            .values()
            .chain(self.by_category.values())
            .map(Vec::len)
            .sum()
    }

    /// Handlers for one event in delivery order.
    fn targets(&self, event: &Event) -> Vec<Subscription> {
        let mut targets = Vec::new();
        for kind in event.delivery_kinds() {
            if let Some(list) = self.by_kind.get(&kind) {
                targets.extend(list.iter().cloned());
            }
        }
        for category in event.delivery_categories() {
            if let Some(list) = self.by_category.get(&category) {
                targets.extend(list.iter().cloned());
            }
        }
        targets
    }
}

struct Shared {
    config: SchedulerConfig,
    pending: Mutex<Vec<Event>>,
    registry: RwLock<Registry>,
    draining: AtomicBool,
    next_subscription: AtomicU64,
}

impl Shared {
    fn publish(&self, event: Event) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let priority = event.priority();
        let at = pending.partition_point(|queued| queued.priority() >= priority);
        pending.insert(at, event);
    }

    fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Clears the in-progress flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Publish-only handle to a [`Scheduler`].
#[derive(Clone)]
pub struct Publisher {
    shared: Arc<Shared>,
}

impl Publisher {
    /// Queue an event for the next drain.
    pub fn publish(&self, event: Event) {
        self.shared.publish(event);
    }

    /// Number of events waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        self.shared.pending_len()
    }
}

impl core::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Publisher")
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// The event scheduler. Cloning yields another handle to the same queue and
/// registry.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .field("pending", &self.pending_len())
            .field("subscriptions", &self.subscription_count())
            .field("draining", &self.is_draining())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                pending: Mutex::new(Vec::new()),
                registry: RwLock::new(Registry::default()),
                draining: AtomicBool::new(false),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> SchedulerConfig {
        self.shared.config
    }

    /// A publish-only handle.
    pub fn publisher(&self) -> Publisher {
        Publisher {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue an event for the next drain.
    pub fn publish(&self, event: Event) {
        self.shared.publish(event);
    }

    /// Number of events waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        self.shared.pending_len()
    }

    /// Total registered subscriptions across kinds and categories.
    pub fn subscription_count(&self) -> usize {
        self.shared
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether a drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::Acquire)
    }

    /// Subscribe to one event kind.
    pub fn subscribe<F, Fut>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(Target::Kind(kind), box_handler(handler), None)
    }

    /// Subscribe to one event kind, receiving only events `filter` accepts.
    pub fn subscribe_filtered<F, Fut, P>(&self, kind: EventKind, handler: F, filter: P) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.register(Target::Kind(kind), box_handler(handler), Some(Arc::new(filter)))
    }

    /// Subscribe to every event of a category.
    pub fn subscribe_category<F, Fut>(&self, category: EventCategory, handler: F) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(Target::Category(category), box_handler(handler), None)
    }

    /// Subscribe to a category, receiving only events `filter` accepts.
    pub fn subscribe_category_filtered<F, Fut, P>(
        &self,
        category: EventCategory,
        handler: F,
        filter: P,
    ) -> SubscriptionId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.register(
            Target::Category(category),
            box_handler(handler),
            Some(Arc::new(filter)),
        )
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    ///
    /// Takes effect from the next event delivered, including within a drain
    /// that is already running.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn register(&self, target: Target, handler: Handler, filter: Option<Filter>) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            handler,
            filter,
        };
        let mut registry = self
            .shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match target {
            Target::Kind(kind) => {
                debug!(subscription = %id, kind = %kind, "subscribed to kind");
                registry.by_kind.entry(kind).or_default().push(subscription);
            }
            Target::Category(category) => {
                debug!(subscription = %id, category = %category, "subscribed to category");
                registry.by_category.entry(category).or_default().push(subscription);
            }
        }
        id
    }

    /// Deliver every event pending at the time of the call.
    ///
    /// The report has `skipped` set when another drain on this
    /// scheduler is already running, including a drain called from inside a
    /// handler.
    pub async fn drain(&self) -> DrainReport {
        if self
            .shared
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress, skipping");
            return DrainReport::skipped_pass();
        }
        let _guard = DrainGuard(&self.shared.draining);

        let batch = std::mem::take(
            &mut *self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut report = DrainReport {
            events: batch.len(),
            ..DrainReport::default()
        };

        for event in batch {
            let event = Arc::new(event);
            let targets = self
                .shared
                .registry
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .targets(&event);

            for subscription in targets {
                match self.invoke(&subscription, Arc::clone(&event)).await {
                    Ok(true) => report.delivered = report.delivered.saturating_add(1),
                    Ok(false) => report.filtered = report.filtered.saturating_add(1),
                    Err(failure) => {
                        report.failures = report.failures.saturating_add(1);
                        warn!(
                            kind = %event.kind(),
                            category = %event.category(),
                            sequence = event.sequence(),
                            subscription = %subscription.id,
                            error = %failure,
                            "event handler failed"
                        );
                    }
                }
            }
        }

        debug!(
            events = report.events,
            delivered = report.delivered,
            filtered = report.filtered,
            failures = report.failures,
            "drain complete"
        );
        report
    }

    /// Run one handler. `Ok(false)` means the filter rejected the event.
    async fn invoke(&self, subscription: &Subscription, event: Arc<Event>) -> Result<bool, DeliveryFailure> {
        let handler = Arc::clone(&subscription.handler);
        let filter = subscription.filter.clone();
        let call = AssertUnwindSafe(async move {
            if let Some(filter) = filter {
                if !filter(&event) {
                    return Ok(false);
                }
            }
            handler(event).await.map(|()| true)
        })
        .catch_unwind();

        let outcome = match self.shared.config.handler_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_elapsed| DeliveryFailure::TimedOut { after })?,
            None => call.await,
        };

        match outcome {
            Ok(result) => result.map_err(DeliveryFailure::Failed),
            Err(payload) => Err(DeliveryFailure::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

enum Target {
    Kind(EventKind),
    Category(EventCategory),
}

fn box_handler<F, Fut>(handler: F) -> Handler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event| handler(event).boxed())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
