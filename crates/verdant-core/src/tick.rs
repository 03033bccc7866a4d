//! Tick cycle: the 6-phase loop step that drives a Verdant world.
//!
//! Each call to [`World::tick`] runs through these phases in order:
//!
//! 1. **Announce** -- advance the clock and publish the `Tick` event at high
//!    priority, carrying the time of day, the daytime flag and the number of
//!    allocated field chunks.
//! 2. **Drain** -- deliver everything pending, the tick event included.
//! 3. **Environment** -- run the solar, water and wind update (and the
//!    optional diffusion pass) over the allocated part of the field.
//! 4. **Subsystems** -- run each registered [`Subsystem`] in registration
//!    order. A failure is logged and the next subsystem runs.
//! 5. **Drain** -- deliver what handlers and subsystems published.
//! 6. **Persist** -- build a [`WorldSnapshot`] and hand it to the world's
//!    snapshot sink.
//!
//! At most one tick runs per world at a time. A second call while a tick is
//! in flight fails with [`TickError::Reentrant`] without touching the clock.
//!
//! [`Subsystem`]: crate::subsystem::Subsystem

use std::panic::AssertUnwindSafe;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};
use verdant_events::{DrainReport, Event, TickEnvironment, TickPayload};
use verdant_types::WorldSnapshot;
use verdant_world::EnvironmentReport;
use verdant_world::environment::{is_daytime, time_of_day};

use crate::clock::ClockError;
use crate::persistence::PersistenceError;
use crate::world::World;

/// Errors that abort a tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// Another tick is already in flight on this world.
    #[error("tick already in progress (current tick {tick})")]
    Reentrant {
        /// The tick that is still running.
        tick: u64,
    },

    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The snapshot could not be built or saved.
    #[error("persistence error: {source}")]
    Persistence {
        /// The underlying persistence error.
        #[from]
        source: PersistenceError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// The tick number that was executed.
    pub tick: u64,
    /// The two scheduler passes, in order.
    pub drains: [DrainReport; 2],
    /// The environment update, if it ran.
    pub environment: Option<EnvironmentReport>,
    /// Subsystems that ran.
    pub subsystems_run: usize,
    /// Subsystems that failed or panicked.
    pub subsystem_failures: usize,
    /// Nodes captured in the snapshot.
    pub nodes: usize,
    /// Whether the snapshot reached the sink.
    pub snapshot_saved: bool,
}

/// Holds the in-flight flag for the duration of a tick.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl World {
    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Reentrant`] if a tick is already in flight,
    /// [`TickError::Clock`] if the counter would overflow, or
    /// [`TickError::Persistence`] if the snapshot could not be saved.
    ///
    /// The counter advances at the start of the tick and is not rolled back:
    /// a tick that fails with [`TickError::Persistence`] has still run every
    /// phase and consumed its tick number.
    pub async fn tick(&self) -> Result<TickReport, TickError> {
        let Some(_guard) = TickGuard::acquire(&self.ticking) else {
            let tick = self.current_tick();
            warn!(world_id = %self.id(), tick, "Tick requested while another is in flight");
            return Err(TickError::Reentrant { tick });
        };

        // --- Phase 1: Announce ---
        let tick = self
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance()?;
        let environment = TickEnvironment {
            time_of_day: time_of_day(tick),
            daytime: is_daytime(tick),
            active_chunks: self.with_field(verdant_world::Field::active_chunk_count),
        };
        info!(
            world_id = %self.id(),
            tick,
            time_of_day = environment.time_of_day,
            daytime = environment.daytime,
            active_chunks = environment.active_chunks,
            "Tick started"
        );
        self.scheduler().publish(
            Event::tick(TickPayload {
                tick,
                delta: 1,
                environment,
            })
            .with_source(self.id().to_string()),
        );

        // --- Phase 2: Drain ---
        let first = self.scheduler().drain().await;

        // --- Phase 3: Environment ---
        let environment = if self.environment_enabled {
            let report = self.with_field_mut(|field| self.environment.apply(field, tick));
            debug!(
                tick,
                chunks = report.chunks_visited,
                cells = report.cells_visited,
                diffused = report.cells_diffused,
                "Environment updated"
            );
            Some(report)
        } else {
            debug!(tick, "Environment update disabled");
            None
        };

        // --- Phase 4: Subsystems ---
        let subsystems = self.subsystems();
        let mut subsystem_failures: usize = 0;
        for subsystem in &subsystems {
            let outcome = AssertUnwindSafe(subsystem.run(self, tick)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => debug!(tick, subsystem = subsystem.name(), "Subsystem finished"),
                Ok(Err(err)) => {
                    subsystem_failures = subsystem_failures.saturating_add(1);
                    warn!(tick, subsystem = subsystem.name(), %err, "Subsystem failed");
                }
                Err(_panic) => {
                    subsystem_failures = subsystem_failures.saturating_add(1);
                    warn!(tick, subsystem = subsystem.name(), "Subsystem panicked");
                }
            }
        }

        // --- Phase 5: Drain ---
        let second = self.scheduler().drain().await;

        // --- Phase 6: Persist ---
        let nodes = self.node_snapshots().map_err(PersistenceError::from)?;
        let node_count = nodes.len();
        let snapshot = WorldSnapshot {
            world_id: self.id(),
            tick,
            timestamp: Utc::now(),
            nodes,
            predictions: self.take_predictions(),
        };
        self.sink.save_snapshot(&snapshot).await?;

        info!(
            world_id = %self.id(),
            tick,
            events = first.events.saturating_add(second.events),
            handler_failures = first.failures.saturating_add(second.failures),
            subsystem_failures,
            nodes = node_count,
            "Tick completed"
        );

        Ok(TickReport {
            tick,
            drains: [first, second],
            environment,
            subsystems_run: subsystems.len(),
            subsystem_failures,
            nodes: node_count,
            snapshot_saved: true,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::future::BoxFuture;
    use verdant_events::EventKind;
    use verdant_types::Layer;

    use super::*;
    use crate::persistence::{MemorySnapshotSink, SnapshotSink};
    use crate::subsystem::{Subsystem, SubsystemError};
    use crate::world::small_world;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Subsystem for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn run<'a>(&'a self, world: &'a World, tick: u64) -> BoxFuture<'a, Result<(), SubsystemError>> {
            async move {
                self.log.lock().unwrap().push(format!("{}@{tick}", self.name));
                world.scheduler().publish(Event::custom(self.name, serde_json::Value::Null));
                if self.fail {
                    return Err(SubsystemError::msg("scripted failure"));
                }
                Ok(())
            }
            .boxed()
        }
    }

    struct FailingSink;

    impl SnapshotSink for FailingSink {
        fn save_snapshot<'a>(&'a self, _snapshot: &'a WorldSnapshot) -> BoxFuture<'a, Result<(), PersistenceError>> {
            futures::future::ready(Err(PersistenceError::Backend {
                message: "disk full".to_owned(),
            }))
            .boxed()
        }
    }

    #[tokio::test]
    async fn tick_runs_phases_in_order() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let world = small_world(sink.clone()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let tick_log = Arc::clone(&log);
        world.scheduler().subscribe(EventKind::Tick, move |event| {
            let tick_log = Arc::clone(&tick_log);
            async move {
                let tick = event.as_tick().map(|t| t.tick).unwrap_or_default();
                tick_log.lock().unwrap().push(format!("tick-event@{tick}"));
                Ok(())
            }
        });
        for name in ["genetics", "disease"] {
            let handler_log = Arc::clone(&log);
            world.scheduler().subscribe(EventKind::custom(name), move |event| {
                let handler_log = Arc::clone(&handler_log);
                async move {
                    handler_log.lock().unwrap().push(format!("delivered:{}", event.kind()));
                    Ok(())
                }
            });
        }
        world.register_subsystem(Arc::new(Recording {
            name: "genetics",
            log: Arc::clone(&log),
            fail: true,
        }));
        world.register_subsystem(Arc::new(Recording {
            name: "disease",
            log: Arc::clone(&log),
            fail: false,
        }));

        let report = world.tick().await.unwrap();

        assert_eq!(report.tick, 1);
        assert_eq!(report.subsystems_run, 2);
        assert_eq!(report.subsystem_failures, 1);
        assert_eq!(report.drains[0].events, 1);
        assert_eq!(report.drains[1].events, 2);
        assert!(report.snapshot_saved);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "tick-event@1",
                "genetics@1",
                "disease@1",
                "delivered:genetics",
                "delivered:disease",
            ]
        );
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn consecutive_ticks_persist_increasing_snapshots() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let world = small_world(sink.clone()).unwrap();

        world.tick().await.unwrap();
        world.tick().await.unwrap();

        let ticks: Vec<u64> = sink.snapshots().iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![1, 2]);
        assert_eq!(world.current_tick(), 2);
        assert!(!world.is_ticking());
    }

    #[tokio::test]
    async fn reentrant_tick_is_rejected() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let world = Arc::new(small_world(sink.clone()).unwrap());
        let outcome = Arc::new(Mutex::new(None));

        struct Reenter {
            outcome: Arc<Mutex<Option<bool>>>,
        }
        impl Subsystem for Reenter {
            fn name(&self) -> &str {
                "reenter"
            }
            fn run<'a>(&'a self, world: &'a World, _tick: u64) -> BoxFuture<'a, Result<(), SubsystemError>> {
                async move {
                    let nested = world.tick().boxed().await;
                    *self.outcome.lock().unwrap() =
                        Some(matches!(nested, Err(TickError::Reentrant { tick: 1 })));
                    Ok(())
                }
                .boxed()
            }
        }
        world.register_subsystem(Arc::new(Reenter {
            outcome: Arc::clone(&outcome),
        }));

        let report = world.tick().await.unwrap();
        assert_eq!(report.subsystem_failures, 0);
        assert_eq!(*outcome.lock().unwrap(), Some(true));
        assert_eq!(world.current_tick(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_propagates_and_releases_guard() {
        let world = small_world(Arc::new(FailingSink)).unwrap();
        let err = world.tick().await.unwrap_err();
        assert!(matches!(err, TickError::Persistence { .. }));
        assert!(!world.is_ticking());
        assert_eq!(world.current_tick(), 1);

        // The failed tick keeps its number; the next one moves on.
        assert!(world.tick().await.is_err());
        assert_eq!(world.current_tick(), 2);
    }

    #[tokio::test]
    async fn environment_runs_over_active_chunks_only() {
        let world = small_world(Arc::new(MemorySnapshotSink::new())).unwrap();
        world.with_field_mut(|field| field.set(3, 3, Layer::SoilMoisture, 0.5));

        let report = world.tick().await.unwrap();
        let environment = report.environment.unwrap();
        assert_eq!(environment.chunks_visited, 1);
        assert_eq!(environment.cells_visited, 256);
        assert_eq!(world.with_field(verdant_world::Field::active_chunk_count), 1);
    }

    #[tokio::test]
    async fn disabled_environment_is_skipped() {
        let world = World::builder()
            .dimensions(32, 32)
            .chunk_size(16)
            .environment_enabled(false)
            .build()
            .unwrap();
        world.with_field_mut(|field| field.set(0, 0, Layer::SoilMoisture, 0.5));
        let report = world.tick().await.unwrap();
        assert!(report.environment.is_none());
        assert_eq!(world.with_field(|f| f.get(0, 0, Layer::SoilMoisture)), 0.5);
    }

    #[tokio::test]
    async fn predictions_ride_along_with_snapshot() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let world = small_world(sink.clone()).unwrap();
        world.stage_predictions(serde_json::json!({ "drought": true }));
        world.tick().await.unwrap();
        world.tick().await.unwrap();

        let snapshots = sink.snapshots();
        assert_eq!(
            snapshots.first().unwrap().predictions,
            Some(serde_json::json!({ "drought": true }))
        );
        assert_eq!(snapshots.get(1).unwrap().predictions, None);
    }
}
