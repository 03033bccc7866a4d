//! Engine binary for the Verdant simulation.
//!
//! Wires the world, its built-in climate subsystem, field seeding, and
//! operator controls together, then runs the tick loop until a bound is
//! reached or the process receives Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `verdant-config.yaml` (or `VERDANT_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the world and its snapshot sink
//! 4. Seed the field with terrain patches
//! 5. Register the climate subsystem and field queries
//! 6. Create operator state from simulation bounds
//! 7. Run the simulation loop
//! 8. Log the result

mod climate;
mod error;
mod progress;
mod seeding;
mod snapshot_log;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use verdant_core::config::LoggingConfig;
use verdant_core::{OperatorState, SimulationConfig, World, runner};

use crate::climate::ClimateMonitor;
use crate::error::EngineError;
use crate::progress::ProgressCallback;
use crate::snapshot_log::LoggingSnapshotSink;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "verdant-config.yaml";

/// Ticks between progress summaries.
const PROGRESS_EVERY: u64 = 100;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging is not up yet, so failures surface
    //    through the returned error.
    let config_path = std::env::var_os("VERDANT_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = SimulationConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(config = %config_path.display(), "verdant-engine starting");
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        width = config.world.width,
        height = config.world.height,
        chunk_size = config.world.chunk_size,
        "Configuration loaded"
    );

    // 3. Build the world.
    let sink = std::env::var_os("VERDANT_SNAPSHOT_DIR")
        .map_or_else(LoggingSnapshotSink::new, LoggingSnapshotSink::with_directory);
    let world = Arc::new(World::from_config(&config, Arc::new(sink))?);
    info!(world_id = %world.id(), name = world.name(), "World created");

    // 4. Seed the field.
    let seeded = world.with_field_mut(|field| seeding::seed_field(field, &config.seeding, config.world.seed));
    info!(patches = seeded.centres.len(), active_chunks = seeded.active_chunks, "Terrain ready");
    if seeded.active_chunks == 0 {
        warn!("No chunks seeded; the environment update will have nothing to do");
    }

    // 5. Register subsystems and request handlers.
    world.register_subsystem(Arc::new(ClimateMonitor::new()));
    climate::serve_field_queries(&world);
    info!(subsystems = world.subsystem_count(), "Subsystems registered");

    // 6. Create operator state.
    let operator = Arc::new(OperatorState::new(&config.simulation));
    let limits = operator.limits();
    info!(
        max_ticks = ?limits.max_ticks,
        max_real_time = ?limits.max_real_time,
        tick_interval_ms = operator.tick_interval_ms(),
        "Operator state initialized"
    );

    // 6b. Stop cleanly between ticks on Ctrl-C.
    {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current tick");
                operator.request_stop();
            }
        });
    }

    // 7. Run the simulation.
    let mut callback = ProgressCallback::new(PROGRESS_EVERY);
    let result = runner::run_simulation(&world, &operator, &mut callback).await?;

    // 8. Log results.
    runner::log_simulation_end(&result);
    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        ticks_observed = callback.ticks_seen(),
        subsystem_failures = callback.failures_seen(),
        "verdant-engine shutdown complete"
    );

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::Logging {
            message: format!("invalid log filter {:?}: {e}", config.level),
        })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
