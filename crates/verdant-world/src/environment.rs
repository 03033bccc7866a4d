//! Environmental update for the Verdant simulation kernel.
//!
//! Once per tick the environment routine advances the physical layers of
//! every in-world cell of every allocated chunk. It is a deterministic
//! procedural approximation, not a fluid solver.
//!
//! # Per-cell pipeline
//!
//! | Step  | Reads                         | Writes                                   |
//! |-------|-------------------------------|------------------------------------------|
//! | Solar | tick, humidity                | light, ultraviolet, temperature          |
//! | Water | temperature, soil, humidity   | soil, humidity, groundwater, temperature |
//! | Wind  | tick, position, temperature   | wind x/y/z                               |
//!
//! followed by an optional neighbour-averaging pass (see [`crate::diffusion`]).
//!
//! # Solar cycle
//!
//! A day lasts [`DAY_LENGTH_TICKS`] ticks. It is daytime while the time of
//! day lies strictly between [`DAWN`] and [`DUSK`]. Sun elevation follows a
//! half sine over that window; humidity attenuates the light to emulate
//! cloud cover.
//!
//! # Determinism
//!
//! The routine keeps no state besides the field itself. It is not
//! idempotent: invoking it twice for the same tick compounds the water cycle
//! and heating, so the orchestrator runs it exactly once per advancing tick.

use std::f64::consts::PI;

use serde::Serialize;
use verdant_types::Layer;

use crate::diffusion::{self, DiffusionSettings};
use crate::field::Field;

/// Ticks in one simulated day.
pub const DAY_LENGTH_TICKS: u64 = 2400;

/// Time of day at which the sun rises (exclusive).
pub const DAWN: u64 = 600;

/// Time of day at which the sun sets (exclusive).
pub const DUSK: u64 = 1800;

/// Peak light intensity at zenith under a clear sky.
pub const MAX_LIGHT: f64 = 1000.0;

/// Fraction of light blocked at humidity 1.0.
pub const CLOUD_ATTENUATION: f64 = 0.8;

/// Temperature gained per unit of light per tick.
pub const SOLAR_HEATING: f64 = 0.0001;

/// Ultraviolet intensity as a fraction of light intensity.
pub const ULTRAVIOLET_FRACTION: f64 = 0.05;

/// Soil moisture evaporated per tick at the reference temperature.
pub const EVAPORATION_RATE: f64 = 0.001;

/// Baseline temperature for evaporation and convection.
pub const REFERENCE_TEMPERATURE: f64 = 20.0;

/// Humidity above which precipitation occurs.
pub const SATURATION_HUMIDITY: f64 = 0.8;

/// Fraction of the excess humidity that precipitates each tick.
pub const PRECIPITATION_FRACTION: f64 = 0.1;

/// Temperature drop per unit of precipitation.
pub const PRECIPITATION_COOLING: f64 = 5.0;

/// Fraction of precipitation that percolates into groundwater.
pub const GROUNDWATER_FRACTION: f64 = 0.2;

/// Spatial frequency of the procedural wind field.
pub const WIND_SPATIAL_SCALE: f64 = 0.01;

/// Phase advance of the wind field per tick.
pub const WIND_PHASE_RATE: f64 = 0.001;

/// Vertical wind per degree of deviation from the reference temperature.
pub const CONVECTION_SCALE: f64 = 0.01;

/// Position of `tick` within its day.
pub const fn time_of_day(tick: u64) -> u64 {
    tick % DAY_LENGTH_TICKS
}

/// Whether the sun is up at `tick`.
pub const fn is_daytime(tick: u64) -> bool {
    let tod = time_of_day(tick);
    tod > DAWN && tod < DUSK
}

/// Sun elevation factor in `0.0..=1.0`.
///
/// `sin(((time_of_day - DAWN) / 1200) * PI)`, clamped at zero.
pub fn sun_elevation(tick: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let tod = time_of_day(tick) as f64;
    #[allow(clippy::cast_precision_loss)]
    let (dawn, span) = (DAWN as f64, (DUSK - DAWN) as f64);
    (((tod - dawn) / span) * PI).sin().max(0.0)
}

/// Light intensity reaching a cell with the given humidity.
///
/// Exactly zero outside daytime, never negative.
pub fn light_intensity(tick: u64, humidity: f64) -> f64 {
    if !is_daytime(tick) {
        return 0.0;
    }
    (sun_elevation(tick) * MAX_LIGHT * (1.0 - humidity * CLOUD_ATTENUATION)).max(0.0)
}

/// Procedural wind vector at a world position.
///
/// Purely positional and tick-driven; not coupled to pressure gradients.
pub fn wind_at(x: u32, y: u32, tick: u64) -> (f64, f64) {
    #[allow(clippy::cast_precision_loss)]
    let phase = tick as f64 * WIND_PHASE_RATE;
    let sx = f64::from(x) * WIND_SPATIAL_SCALE;
    let sy = f64::from(y) * WIND_SPATIAL_SCALE;
    ((sx + phase).sin() * sy.cos(), sx.cos() * (sy + phase).sin())
}

/// Per-tick solar state shared by every cell.
#[derive(Debug, Clone, Copy)]
struct SolarState {
    daytime: bool,
    tick: u64,
}

/// Summary of one environment update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    /// The tick the update ran for.
    pub tick: u64,
    /// Whether the sun was up.
    pub daytime: bool,
    /// Allocated chunks visited.
    pub chunks_visited: usize,
    /// In-world cells visited.
    pub cells_visited: u64,
    /// Cells touched by the diffusion pass (0 when disabled).
    pub cells_diffused: u64,
}

/// The environment update routine.
///
/// Holds only configuration; all state lives in the [`Field`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentSystem {
    diffusion: DiffusionSettings,
}

impl EnvironmentSystem {
    /// Create an environment system with the given diffusion settings.
    pub const fn new(diffusion: DiffusionSettings) -> Self {
        Self { diffusion }
    }

    /// The diffusion settings in effect.
    pub const fn diffusion(&self) -> &DiffusionSettings {
        &self.diffusion
    }

    /// Advance the field's physical layers for `tick`.
    ///
    /// Visits only in-world cells of allocated chunks.
    pub fn apply(&self, field: &mut Field, tick: u64) -> EnvironmentReport {
        let solar = SolarState {
            daytime: is_daytime(tick),
            tick,
        };

        let mut chunks_visited: usize = 0;
        let mut cells_visited: u64 = 0;

        field.for_each_active_chunk_mut(|_, chunk| {
            chunks_visited = chunks_visited.saturating_add(1);
            chunk.for_each_cell_mut(|x, y, cell| {
                update_cell(cell, x, y, solar);
                cells_visited = cells_visited.saturating_add(1);
            });
        });

        let cells_diffused = diffusion::apply(field, &self.diffusion);

        tracing::debug!(
            tick,
            daytime = solar.daytime,
            chunks_visited,
            cells_visited,
            cells_diffused,
            "Environment updated"
        );

        EnvironmentReport {
            tick,
            daytime: solar.daytime,
            chunks_visited,
            cells_visited,
            cells_diffused,
        }
    }
}

/// Read a layer from a cell slice as `f64`.
fn read(cell: &[f32], layer: Layer) -> f64 {
    cell.get(layer.index()).copied().map_or(0.0, f64::from)
}

/// Write a layer into a cell slice.
#[allow(clippy::cast_possible_truncation)]
fn write(cell: &mut [f32], layer: Layer, value: f64) {
    if let Some(slot) = cell.get_mut(layer.index()) {
        *slot = value as f32;
    }
}

/// Run the solar, water, and wind steps on one cell.
fn update_cell(cell: &mut [f32], x: u32, y: u32, solar: SolarState) {
    // Solar
    if solar.daytime {
        let light = light_intensity(solar.tick, read(cell, Layer::Humidity));
        write(cell, Layer::Light, light);
        write(cell, Layer::Ultraviolet, light * ULTRAVIOLET_FRACTION);
        let temperature = read(cell, Layer::Temperature);
        write(cell, Layer::Temperature, temperature + light * SOLAR_HEATING);
    } else {
        write(cell, Layer::Light, 0.0);
        write(cell, Layer::Ultraviolet, 0.0);
    }

    // Water
    let mut temperature = read(cell, Layer::Temperature);
    let mut soil = read(cell, Layer::SoilMoisture);
    let mut humidity = read(cell, Layer::Humidity);

    let evaporation =
        (EVAPORATION_RATE * temperature / REFERENCE_TEMPERATURE).clamp(0.0, soil.max(0.0));
    soil -= evaporation;
    humidity += evaporation;

    if humidity > SATURATION_HUMIDITY {
        let precipitation = (humidity - SATURATION_HUMIDITY) * PRECIPITATION_FRACTION;
        humidity -= precipitation;
        soil += precipitation * (1.0 - GROUNDWATER_FRACTION);
        let groundwater = read(cell, Layer::Groundwater);
        write(cell, Layer::Groundwater, groundwater + precipitation * GROUNDWATER_FRACTION);
        temperature -= precipitation * PRECIPITATION_COOLING;
    }

    write(cell, Layer::SoilMoisture, soil);
    write(cell, Layer::Humidity, humidity);
    write(cell, Layer::Temperature, temperature);

    // Wind
    let (wind_x, wind_y) = wind_at(x, y, solar.tick);
    write(cell, Layer::WindX, wind_x);
    write(cell, Layer::WindY, wind_y);
    write(
        cell,
        Layer::WindZ,
        (temperature - REFERENCE_TEMPERATURE) * CONVECTION_SCALE,
    );
}

#[cfg(test)]
#[allow(
    clippy::float_cmp,
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;

    fn seeded_field() -> Field {
        let mut field = Field::new(64, 64, 16).unwrap();
        field.set(5, 5, Layer::Temperature, 25.0);
        field.set(5, 5, Layer::SoilMoisture, 0.5);
        field.set(5, 5, Layer::Humidity, 0.2);
        field
    }

    #[test]
    fn daytime_window_is_exclusive() {
        assert!(!is_daytime(600));
        assert!(is_daytime(601));
        assert!(is_daytime(1799));
        assert!(!is_daytime(1800));
        assert!(!is_daytime(0));
        assert!(is_daytime(2400 + 1200));
    }

    #[test]
    fn light_is_zero_outside_daytime_and_non_negative_inside() {
        for tick in (0..DAY_LENGTH_TICKS).step_by(7) {
            for humidity in [0.0, 0.5, 1.0, 2.0] {
                let light = light_intensity(tick, humidity);
                if is_daytime(tick) {
                    assert!(light >= 0.0, "negative light at tick {tick}");
                } else {
                    assert_eq!(light, 0.0, "light at night tick {tick}");
                }
            }
        }
    }

    #[test]
    fn noon_light_matches_formula_exactly() {
        let expected = (((1200.0_f64 - 600.0) / 1200.0) * PI).sin().max(0.0) * 1000.0;
        assert_eq!(light_intensity(1200, 0.0), expected);
        assert_eq!(light_intensity(DAY_LENGTH_TICKS * 3 + 1200, 0.0), expected);
    }

    #[test]
    fn humidity_attenuates_light() {
        let clear = light_intensity(1200, 0.0);
        let cloudy = light_intensity(1200, 0.5);
        assert!((cloudy - clear * 0.6).abs() < 1e-9);
    }

    #[test]
    fn noon_cell_receives_light_and_heat() {
        let mut field = Field::new(16, 16, 16).unwrap();
        field.set(2, 2, Layer::Temperature, 20.0);
        let report = EnvironmentSystem::default().apply(&mut field, 1200);

        assert!(report.daytime);
        assert_eq!(field.get(2, 2, Layer::Light), light_intensity(1200, 0.0) as f32);
        assert!(field.get(2, 2, Layer::Ultraviolet) > 0.0);
        assert!(field.get(2, 2, Layer::Temperature) > 20.0);
    }

    #[test]
    fn night_clears_light_and_ultraviolet() {
        let mut field = seeded_field();
        field.set(5, 5, Layer::Light, 400.0);
        field.set(5, 5, Layer::Ultraviolet, 20.0);
        EnvironmentSystem::default().apply(&mut field, 100);
        assert_eq!(field.get(5, 5, Layer::Light), 0.0);
        assert_eq!(field.get(5, 5, Layer::Ultraviolet), 0.0);
    }

    #[test]
    fn evaporation_moves_soil_moisture_into_humidity() {
        let mut field = seeded_field();
        EnvironmentSystem::default().apply(&mut field, 0);

        let expected = EVAPORATION_RATE * 25.0 / REFERENCE_TEMPERATURE;
        let soil = f64::from(field.get(5, 5, Layer::SoilMoisture));
        let humidity = f64::from(field.get(5, 5, Layer::Humidity));
        assert!((soil - (0.5 - expected)).abs() < 1e-6);
        assert!((humidity - (0.2 + expected)).abs() < 1e-6);
    }

    #[test]
    fn evaporation_is_capped_by_available_soil_moisture() {
        let mut field = Field::new(8, 8, 8).unwrap();
        field.set(0, 0, Layer::Temperature, 4000.0);
        field.set(0, 0, Layer::SoilMoisture, 0.01);
        EnvironmentSystem::default().apply(&mut field, 0);
        assert_eq!(field.get(0, 0, Layer::SoilMoisture), 0.0);
        assert!((field.get(0, 0, Layer::Humidity) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn saturated_air_rains_and_cools() {
        let mut field = Field::new(8, 8, 8).unwrap();
        field.set(1, 1, Layer::Humidity, 1.0);
        field.set(1, 1, Layer::Temperature, 0.0);
        EnvironmentSystem::default().apply(&mut field, 0);

        let precipitation = (1.0 - SATURATION_HUMIDITY) * PRECIPITATION_FRACTION;
        assert!((f64::from(field.get(1, 1, Layer::Humidity)) - (1.0 - precipitation)).abs() < 1e-6);
        assert!(
            (f64::from(field.get(1, 1, Layer::SoilMoisture))
                - precipitation * (1.0 - GROUNDWATER_FRACTION))
                .abs()
                < 1e-6
        );
        assert!(
            (f64::from(field.get(1, 1, Layer::Groundwater)) - precipitation * GROUNDWATER_FRACTION)
                .abs()
                < 1e-6
        );
        assert!(
            (f64::from(field.get(1, 1, Layer::Temperature)) + precipitation * PRECIPITATION_COOLING)
                .abs()
                < 1e-6
        );
    }

    #[test]
    fn wind_is_deterministic_and_convection_follows_temperature() {
        let mut a = seeded_field();
        let mut b = seeded_field();
        EnvironmentSystem::default().apply(&mut a, 77);
        EnvironmentSystem::default().apply(&mut b, 77);
        assert_eq!(a.cell(5, 5), b.cell(5, 5));

        let (wx, wy) = wind_at(5, 5, 77);
        assert_eq!(a.get(5, 5, Layer::WindX), wx as f32);
        assert_eq!(a.get(5, 5, Layer::WindY), wy as f32);
        // temperature stays above the baseline after a tiny evaporation step
        assert!(a.get(5, 5, Layer::WindZ) > 0.0);
    }

    #[test]
    fn update_never_allocates_new_chunks() {
        let mut field = seeded_field();
        let report = EnvironmentSystem::default().apply(&mut field, 1500);
        assert_eq!(field.active_chunk_count(), 1);
        assert_eq!(report.chunks_visited, 1);
        assert_eq!(report.cells_visited, 16 * 16);
        assert_eq!(report.cells_diffused, 0);
    }

    #[test]
    fn repeated_application_compounds() {
        let mut field = seeded_field();
        let system = EnvironmentSystem::default();
        system.apply(&mut field, 10);
        let once = field.get(5, 5, Layer::SoilMoisture);
        system.apply(&mut field, 10);
        assert!(field.get(5, 5, Layer::SoilMoisture) < once);
    }
}
