//! The bounded run loop around [`World::tick`].
//!
//! Between ticks the loop honours the [`OperatorState`]: it waits while
//! paused, stops on request or when a bound is reached, publishes queued
//! operator events, and sleeps for the current tick interval.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::operator::{OperatorState, SimulationEndReason};
use crate::tick::{TickError, TickReport};
use crate::world::World;

/// Errors that end a run early.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Outcome of [`run_simulation`].
#[derive(Debug)]
pub struct SimulationResult {
    /// Why the loop stopped.
    pub end_reason: SimulationEndReason,
    /// Report of the last completed tick.
    pub final_report: Option<TickReport>,
    /// Ticks executed by this run.
    pub total_ticks: u64,
}

/// Observer invoked after every completed tick.
pub trait TickCallback: Send {
    /// Called with the tick's report and the world it ran on.
    fn on_tick(&mut self, report: &TickReport, world: &World);
}

/// A callback that ignores every tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &TickReport, _world: &World) {}
}

/// Reason to stop before starting another tick, if any.
fn stop_before_tick(operator: &OperatorState) -> Option<SimulationEndReason> {
    if operator.is_stop_requested() {
        info!("Operator stop requested");
        return Some(SimulationEndReason::OperatorStop);
    }
    if operator.time_limit_reached() {
        info!(elapsed_secs = operator.elapsed().as_secs(), "Real-time limit reached");
        return Some(SimulationEndReason::MaxRealTimeReached);
    }
    None
}

/// Tick `world` until the operator stops it or a bound is reached.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails. Handler and subsystem failures
/// never fail a tick; persistence failures and re-entrancy do.
pub async fn run_simulation(
    world: &World,
    operator: &Arc<OperatorState>,
    callback: &mut dyn TickCallback,
) -> Result<SimulationResult, RunnerError> {
    let limits = operator.limits();
    info!(
        world_id = %world.id(),
        start_tick = world.current_tick(),
        max_ticks = ?limits.max_ticks,
        max_real_time = ?limits.max_real_time,
        tick_interval_ms = operator.tick_interval_ms(),
        "Simulation starting"
    );

    let mut final_report: Option<TickReport> = None;
    let mut total_ticks: u64 = 0;

    let end_reason = loop {
        if operator.is_paused() {
            info!("Simulation paused");
            operator.wait_if_paused().await;
            info!("Simulation resumed");
        }
        if let Some(reason) = stop_before_tick(operator) {
            break reason;
        }

        for injected in operator.drain_injected_events() {
            debug!(kind = %injected.kind, description = ?injected.description, "Publishing injected event");
            world.scheduler().publish(injected.into_event());
        }

        let report = world.tick().await?;
        total_ticks = total_ticks.saturating_add(1);
        callback.on_tick(&report, world);

        let done = limits.ticks_exhausted(report.tick);
        final_report = Some(report);
        if done {
            info!(max_ticks = ?limits.max_ticks, "Tick limit reached");
            break SimulationEndReason::MaxTicksReached;
        }

        match operator.tick_interval_ms() {
            0 => tokio::task::yield_now().await,
            ms => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    };

    operator.set_end_reason(end_reason);
    Ok(SimulationResult {
        end_reason,
        final_report,
        total_ticks,
    })
}

/// Log how a run ended.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_report.as_ref().map(|r| r.tick),
        "Simulation ended"
    );

    match &result.final_report {
        Some(report) => info!(
            tick = report.tick,
            nodes = report.nodes,
            subsystem_failures = report.subsystem_failures,
            "Final tick report"
        ),
        None => warn!("Simulation ended with no ticks executed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use verdant_events::{EventCategory, EventKind};

    use super::*;
    use crate::config::SimulationBoundsConfig;
    use crate::operator::InjectedEvent;
    use crate::persistence::MemorySnapshotSink;
    use crate::world::small_world;

    fn operator(max_ticks: u64) -> Arc<OperatorState> {
        Arc::new(OperatorState::new(&SimulationBoundsConfig {
            max_ticks,
            max_real_time_seconds: 0,
            tick_interval_ms: 0,
        }))
    }

    #[tokio::test]
    async fn stops_after_max_ticks() {
        let sink = Arc::new(MemorySnapshotSink::new());
        let world = small_world(sink.clone()).unwrap();
        let operator = operator(5);

        let result = run_simulation(&world, &operator, &mut NoOpCallback).await.unwrap();

        assert_eq!(result.end_reason, SimulationEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 5);
        assert_eq!(result.final_report.unwrap().tick, 5);
        assert_eq!(sink.len(), 5);
        assert_eq!(operator.end_reason(), Some(SimulationEndReason::MaxTicksReached));
    }

    #[tokio::test]
    async fn stop_before_first_tick_runs_nothing() {
        let world = small_world(Arc::new(MemorySnapshotSink::new())).unwrap();
        let operator = operator(0);
        operator.request_stop();

        let result = run_simulation(&world, &operator, &mut NoOpCallback).await.unwrap();

        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_report.is_none());
        assert_eq!(world.current_tick(), 0);
    }

    #[tokio::test]
    async fn callback_sees_every_tick() {
        struct Ticks(Vec<u64>);
        impl TickCallback for Ticks {
            fn on_tick(&mut self, report: &TickReport, _world: &World) {
                self.0.push(report.tick);
            }
        }

        let world = small_world(Arc::new(MemorySnapshotSink::new())).unwrap();
        let mut ticks = Ticks(Vec::new());
        run_simulation(&world, &operator(3), &mut ticks).await.unwrap();
        assert_eq!(ticks.0, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn callback_can_stop_the_run() {
        struct StopAt(Arc<OperatorState>, u64);
        impl TickCallback for StopAt {
            fn on_tick(&mut self, report: &TickReport, _world: &World) {
                if report.tick == self.1 {
                    self.0.request_stop();
                }
            }
        }

        let world = small_world(Arc::new(MemorySnapshotSink::new())).unwrap();
        let operator = operator(0);
        let mut stopper = StopAt(Arc::clone(&operator), 2);
        let result = run_simulation(&world, &operator, &mut stopper).await.unwrap();

        assert_eq!(result.end_reason, SimulationEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 2);
        assert_eq!(result.final_report.unwrap().tick, 2);
    }

    #[tokio::test]
    async fn injected_events_are_delivered_in_next_tick() {
        let world = small_world(Arc::new(MemorySnapshotSink::new())).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        world.scheduler().subscribe_category(
            EventCategory::custom(InjectedEvent::CATEGORY),
            move |event| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(event.kind());
                    Ok(())
                }
            },
        );

        let operator = operator(1);
        operator.inject_event(InjectedEvent {
            kind: "meteor".to_owned(),
            priority: None,
            data: serde_json::Value::Null,
            description: Some("test strike".to_owned()),
        });

        run_simulation(&world, &operator, &mut NoOpCallback).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::custom("meteor")]);
    }
}
