//! Event scheduling for the Verdant simulation kernel.
//!
//! Subsystems communicate by publishing [`Event`]s onto a shared
//! [`Scheduler`] and subscribing to the kinds or categories they care about.
//! Delivery happens in explicit drain passes driven by the tick orchestrator,
//! in deterministic priority order, one handler at a time. A failing handler
//! is isolated: it is logged and the pass continues.

pub mod error;
pub mod event;
pub mod scheduler;

pub use error::{DeliveryFailure, HandlerError};
pub use event::{
    AsyncRequest, Event, EventCategory, EventKind, EventPayload, Reply, Responder,
    TickEnvironment, TickPayload, priority,
};
pub use scheduler::{
    DEFAULT_HANDLER_TIMEOUT, DrainReport, Filter, Handler, Publisher, Scheduler, SchedulerConfig,
    SubscriptionId,
};
