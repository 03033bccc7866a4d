//! Tick callback that reports simulation progress through tracing.

use tracing::{debug, info, warn};
use verdant_core::{TickCallback, TickReport, World};
use verdant_types::Layer;

/// Logs every tick at debug level and a field summary every `every` ticks.
#[derive(Debug, Clone)]
pub struct ProgressCallback {
    every: u64,
    ticks_seen: u64,
    failures_seen: u64,
}

impl ProgressCallback {
    /// Summarize every `every` ticks. Zero disables summaries.
    pub const fn new(every: u64) -> Self {
        Self {
            every,
            ticks_seen: 0,
            failures_seen: 0,
        }
    }

    /// Ticks observed so far.
    pub const fn ticks_seen(&self) -> u64 {
        self.ticks_seen
    }

    /// Subsystem failures observed so far.
    pub const fn failures_seen(&self) -> u64 {
        self.failures_seen
    }

    fn summary_due(&self, tick: u64) -> bool {
        self.every > 0 && tick.checked_rem(self.every) == Some(0)
    }
}

impl TickCallback for ProgressCallback {
    fn on_tick(&mut self, report: &TickReport, world: &World) {
        self.ticks_seen = self.ticks_seen.saturating_add(1);
        self.failures_seen = self
            .failures_seen
            .saturating_add(u64::try_from(report.subsystem_failures).unwrap_or(u64::MAX));

        let [early, late] = &report.drains;
        debug!(
            tick = report.tick,
            early_events = early.events,
            late_events = late.events,
            handler_failures = early.failures.saturating_add(late.failures),
            subsystems = report.subsystems_run,
            "Tick complete"
        );
        if report.subsystem_failures > 0 {
            warn!(
                tick = report.tick,
                failures = report.subsystem_failures,
                "Subsystems failed this tick"
            );
        }

        if !self.summary_due(report.tick) {
            return;
        }
        let (temperature, vegetation, chunks) = world.with_field(|field| {
            (
                field.statistics(Layer::Temperature),
                field.statistics(Layer::Vegetation),
                field.active_chunk_count(),
            )
        });
        let clock = world.clock();
        info!(
            tick = report.tick,
            day = clock.day(),
            daytime = clock.is_daytime(),
            active_chunks = chunks,
            nodes = report.nodes,
            mean_temperature = temperature.map(|s| s.mean),
            mean_vegetation = vegetation.map(|s| s.mean),
            "Progress"
        );
    }
}
