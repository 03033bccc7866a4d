//! Climate monitor: the engine's built-in subsystem.
//!
//! After the environment update it samples the field, publishes a
//! `climate_report` event for the second drain, and stages a naive
//! temperature forecast that rides along with the tick's snapshot. It also
//! answers `field_statistics` and `cell` requests from outside the tick.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use verdant_core::request::serve;
use verdant_core::{Subsystem, SubsystemError, World};
use verdant_events::{Event, EventCategory, SubscriptionId, priority};
use verdant_types::Layer;

/// Kind of the event published after every sample.
pub const CLIMATE_REPORT: &str = "climate_report";

/// Layers sampled on every tick.
const SAMPLED: [Layer; 4] = [
    Layer::Temperature,
    Layer::Humidity,
    Layer::SoilMoisture,
    Layer::Vegetation,
];

/// Samples field statistics and forecasts temperature one tick ahead.
#[derive(Debug, Default)]
pub struct ClimateMonitor {
    last_mean_temperature: Mutex<Option<f64>>,
}

impl ClimateMonitor {
    /// Create a monitor with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Linear extrapolation from the previous sample; flat on the first.
    fn forecast(&self, mean: f64) -> f64 {
        let mut last = self
            .last_mean_temperature
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = last.map_or(mean, |previous| mean + (mean - previous));
        *last = Some(mean);
        next
    }

    fn sample(world: &World) -> serde_json::Map<String, serde_json::Value> {
        world.with_field(|field| {
            SAMPLED
                .iter()
                .filter_map(|&layer| field.statistics(layer))
                .filter_map(|stats| {
                    let value = serde_json::to_value(stats).ok()?;
                    Some((stats.layer.to_string(), value))
                })
                .collect()
        })
    }
}

impl Subsystem for ClimateMonitor {
    fn name(&self) -> &str {
        "climate"
    }

    fn run<'a>(&'a self, world: &'a World, tick: u64) -> BoxFuture<'a, Result<(), SubsystemError>> {
        async move {
            let layers = Self::sample(world);
            let mean_temperature = layers
                .get(&Layer::Temperature.to_string())
                .and_then(|stats| stats.get("mean"))
                .and_then(serde_json::Value::as_f64);

            if let Some(mean) = mean_temperature {
                let forecast = self.forecast(mean);
                world.stage_predictions(serde_json::json!({
                    "source": self.name(),
                    "tick": tick.saturating_add(1),
                    "mean_temperature": forecast,
                }));
            }

            debug!(tick, layers = layers.len(), "Climate sampled");
            world.scheduler().publish(
                Event::custom(
                    CLIMATE_REPORT,
                    serde_json::json!({ "tick": tick, "layers": layers }),
                )
                .with_category(EventCategory::Environment)
                .with_priority(priority::LOW)
                .with_source(self.name()),
            );
            Ok(())
        }
        .boxed()
    }
}

/// Answer `field_statistics` and `cell` requests against `world`.
///
/// `field_statistics` takes `{"layer": "<name>"}`; `cell` takes
/// `{"x": i64, "y": i64}` and returns every layer of that cell.
///
/// The handlers hold the world weakly; the scheduler they live in is owned
/// by that world.
pub fn serve_field_queries(world: &Arc<World>) -> [SubscriptionId; 2] {
    let stats_world = Arc::downgrade(world);
    let statistics = serve(world.scheduler(), "field_statistics", move |data| {
        let world = upgrade(&stats_world)?;
        let raw = data.get("layer").cloned().ok_or("missing layer")?;
        let layer: Layer = serde_json::from_value(raw).map_err(|e| format!("unknown layer: {e}"))?;
        let stats = world.with_field(|field| field.statistics(layer));
        serde_json::to_value(stats).map_err(|e| e.to_string())
    });

    let cell_world = Arc::downgrade(world);
    let cell = serve(world.scheduler(), "cell", move |data| {
        let world = upgrade(&cell_world)?;
        let x = data.get("x").and_then(serde_json::Value::as_i64).ok_or("missing x")?;
        let y = data.get("y").and_then(serde_json::Value::as_i64).ok_or("missing y")?;
        let values = world.with_field(|field| {
            field.cell(x, y).map(|cell| {
                Layer::ALL
                    .iter()
                    .zip(cell)
                    .map(|(layer, value)| (layer.to_string(), serde_json::json!(value)))
                    .collect::<serde_json::Map<_, _>>()
            })
        });
        Ok(values.map_or(serde_json::Value::Null, serde_json::Value::Object))
    });

    [statistics, cell]
}

fn upgrade(world: &Weak<World>) -> Result<Arc<World>, String> {
    world.upgrade().ok_or_else(|| "world is shutting down".to_owned())
}
