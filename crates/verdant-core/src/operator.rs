//! Control plane shared between the run loop and whoever steers it.
//!
//! An [`OperatorState`] lives in an `Arc`. The run loop polls it between
//! ticks; a front end (signal handler, HTTP endpoint, test) flips its flags.
//! Flags are atomics. The injected-event queue and the end reason are
//! short `std::sync::Mutex` sections that are never held across an await.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use verdant_events::{Event, EventCategory, priority};

use crate::config::SimulationBoundsConfig;
use crate::world::World;

/// Longest tick interval the operator may set, in milliseconds.
pub const MAX_TICK_INTERVAL_MS: u64 = 3_600_000;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// The tick bound was reached.
    MaxTicksReached,
    /// The wall-clock bound was reached.
    MaxRealTimeReached,
    /// Someone called [`OperatorState::request_stop`].
    OperatorStop,
}

/// Upper bounds on a run. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunLimits {
    /// Last tick to execute.
    pub max_ticks: Option<u64>,
    /// Wall-clock budget.
    pub max_real_time: Option<Duration>,
}

impl RunLimits {
    /// Read limits from config, where 0 means unbounded.
    pub const fn from_config(bounds: &SimulationBoundsConfig) -> Self {
        Self {
            max_ticks: if bounds.max_ticks == 0 {
                None
            } else {
                Some(bounds.max_ticks)
            },
            max_real_time: if bounds.max_real_time_seconds == 0 {
                None
            } else {
                Some(Duration::from_secs(bounds.max_real_time_seconds))
            },
        }
    }

    /// Whether `tick` is the last tick the run may execute.
    pub const fn ticks_exhausted(&self, tick: u64) -> bool {
        match self.max_ticks {
            Some(max) => tick >= max,
            None => false,
        }
    }

    /// Whether `elapsed` has used up the wall-clock budget.
    pub fn time_exhausted(&self, elapsed: Duration) -> bool {
        self.max_real_time.is_some_and(|max| elapsed >= max)
    }
}

/// An event queued by the operator, published just before the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectedEvent {
    /// Custom kind name, e.g. `"drought"`.
    pub kind: String,
    /// Delivery priority; normal when absent.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Payload handed to subscribers.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Shown in the log when published.
    #[serde(default)]
    pub description: Option<String>,
}

impl InjectedEvent {
    /// Category every injected event is delivered under, besides its kind.
    pub const CATEGORY: &'static str = "operator";

    /// Build the scheduler event.
    pub fn into_event(self) -> Event {
        Event::custom(self.kind, self.data)
            .with_priority(self.priority.unwrap_or(priority::NORMAL))
            .with_category(EventCategory::custom(Self::CATEGORY))
            .with_source(Self::CATEGORY)
    }
}

/// Pause, stop, speed, and injection controls for one run.
#[derive(Debug)]
pub struct OperatorState {
    paused: AtomicBool,
    stop_requested: AtomicBool,
    wake: Notify,
    tick_interval_ms: AtomicU64,
    limits: RunLimits,
    started: Instant,
    started_at: DateTime<Utc>,
    injected: Mutex<Vec<InjectedEvent>>,
    end_reason: Mutex<Option<SimulationEndReason>>,
}

impl OperatorState {
    /// Controls for a run bounded by `bounds`. The run clock starts now.
    pub fn new(bounds: &SimulationBoundsConfig) -> Self {
        Self {
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            wake: Notify::new(),
            tick_interval_ms: AtomicU64::new(bounds.tick_interval_ms.min(MAX_TICK_INTERVAL_MS)),
            limits: RunLimits::from_config(bounds),
            started: Instant::now(),
            started_at: Utc::now(),
            injected: Mutex::new(Vec::new()),
            end_reason: Mutex::new(None),
        }
    }

    /// Whether the loop should hold before the next tick.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Hold the loop before its next tick.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Release a paused loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Resolve once the loop may proceed: not paused, or asked to stop.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            self.wake.notified().await;
        }
    }

    /// Ask the loop to stop before its next tick. Also releases a pause.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether a stop has been asked for.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Record why the run ended.
    pub fn set_end_reason(&self, reason: SimulationEndReason) {
        *self
            .end_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason);
    }

    /// Why the run ended, once it has.
    pub fn end_reason(&self) -> Option<SimulationEndReason> {
        *self
            .end_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Pause between ticks in milliseconds; 0 yields instead of sleeping.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the pause between ticks. Returns the previous value, or
    /// `None` (leaving it unchanged) above [`MAX_TICK_INTERVAL_MS`].
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        (ms <= MAX_TICK_INTERVAL_MS).then(|| self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    /// The bounds this run was created with.
    pub const fn limits(&self) -> RunLimits {
        self.limits
    }

    /// Wall-clock time since the controls were created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the wall-clock budget is spent.
    pub fn time_limit_reached(&self) -> bool {
        self.limits.time_exhausted(self.elapsed())
    }

    /// When the run started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Queue an event for the next tick.
    pub fn inject_event(&self, event: InjectedEvent) {
        self.injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain_injected_events(&self) -> Vec<InjectedEvent> {
        std::mem::take(&mut *self.injected.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Controls and world vitals in one serializable value.
    pub fn status(&self, world: &World) -> SimulationStatus {
        SimulationStatus {
            tick: world.current_tick(),
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            tick_interval_ms: self.tick_interval_ms(),
            elapsed_seconds: self.elapsed().as_secs(),
            max_ticks: self.limits.max_ticks,
            max_real_time_seconds: self.limits.max_real_time.map(|d| d.as_secs()),
            nodes: world.node_count(),
            active_chunks: world.with_field(verdant_world::Field::active_chunk_count),
            pending_events: world.scheduler().pending_len(),
            end_reason: self.end_reason(),
            started_at: self.started_at,
        }
    }
}

/// Serializable view of a run for status endpoints and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStatus {
    /// Last completed tick.
    pub tick: u64,
    /// Paused flag.
    pub paused: bool,
    /// Stop flag.
    pub stop_requested: bool,
    /// Pause between ticks.
    pub tick_interval_ms: u64,
    /// Whole seconds since start.
    pub elapsed_seconds: u64,
    /// Tick bound, if any.
    pub max_ticks: Option<u64>,
    /// Wall-clock bound, if any.
    pub max_real_time_seconds: Option<u64>,
    /// Registered nodes.
    pub nodes: usize,
    /// Allocated field chunks.
    pub active_chunks: usize,
    /// Events waiting for the next drain.
    pub pending_events: usize,
    /// Set once the run has ended.
    pub end_reason: Option<SimulationEndReason>,
    /// Start of the run.
    pub started_at: DateTime<Utc>,
}
