//! World clock, tick orchestration, and run loop for the Verdant simulation.
//!
//! This crate owns the [`World`] and the 6-phase tick that drives it:
//! announce, drain, environment, subsystems, drain, persist.
//!
//! # Modules
//!
//! - [`clock`] -- World clock with the tick counter and day/night derivation.
//! - [`config`] -- Configuration loading from `verdant-config.yaml` into
//!   strongly-typed structs.
//! - [`node`] -- Nodes and the [`Component`] serialization seam.
//! - [`operator`] -- Shared pause/resume/stop/inject control state.
//! - [`persistence`] -- The [`SnapshotSink`] seam and in-process sinks.
//! - [`request`] -- Tick-aligned request/response over the scheduler.
//! - [`runner`] -- The bounded run loop around [`World::tick`].
//! - [`subsystem`] -- The [`Subsystem`] seam for external collaborators.
//! - [`tick`] -- The 6-phase tick cycle.
//! - [`world`] -- [`World`] and its builder.
//!
//! [`Component`]: node::Component
//! [`SnapshotSink`]: persistence::SnapshotSink
//! [`Subsystem`]: subsystem::Subsystem
//! [`World`]: world::World
//! [`World::tick`]: world::World::tick

pub mod clock;
pub mod config;
pub mod node;
pub mod operator;
pub mod persistence;
pub mod request;
pub mod runner;
pub mod subsystem;
pub mod tick;
pub mod world;

pub use clock::{ClockError, WorldClock};
pub use config::{ConfigError, SimulationConfig};
pub use node::{Component, Node};
pub use operator::{InjectedEvent, OperatorState, RunLimits, SimulationEndReason, SimulationStatus};
pub use persistence::{MemorySnapshotSink, NullSnapshotSink, PersistenceError, SnapshotSink};
pub use request::{RequestBridge, RequestError};
pub use runner::{NoOpCallback, RunnerError, SimulationResult, TickCallback, run_simulation};
pub use subsystem::{Subsystem, SubsystemError};
pub use tick::{TickError, TickReport};
pub use world::{World, WorldBuilder, WorldError, small_world};
