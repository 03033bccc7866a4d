//! Initial field seeding.
//!
//! A fresh [`Field`] has no allocated chunks, so nothing would ever be
//! updated. The engine scatters a handful of circular "biome patches" at
//! start-up. Each patch raises elevation, soil, and vegetation towards its
//! centre, which allocates the chunks it covers and gives the environment
//! something to work on. Placement is driven by the world seed so two runs
//! with the same config start from the same field.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use verdant_core::config::SeedingConfig;
use verdant_types::Layer;
use verdant_world::Field;

/// Per-patch base values, scaled by the radial falloff.
struct PatchProfile {
    elevation: f64,
    temperature: f64,
    humidity: f64,
    soil_moisture: f64,
    nutrients: f64,
    vegetation: f64,
}

/// What a seeding pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    /// Patch centres, in placement order.
    pub centres: Vec<(u32, u32)>,
    /// Cells written across all patches (overlaps counted twice).
    pub cells_written: u64,
    /// Chunks allocated once seeding finished.
    pub active_chunks: usize,
}

/// Scatter `config.patches` circular patches over `field`.
pub fn seed_field(field: &mut Field, config: &SeedingConfig, seed: u64) -> SeedSummary {
    let mut rng = StdRng::seed_from_u64(seed);
    let radius = i32::try_from(config.patch_radius).unwrap_or(i32::MAX);
    let mut centres = Vec::new();
    let mut cells_written: u64 = 0;

    for _ in 0..config.patches {
        let cx = rng.random_range(0..field.width());
        let cy = rng.random_range(0..field.height());
        let profile = PatchProfile {
            elevation: rng.random_range(50.0..400.0),
            temperature: rng.random_range(8.0..24.0),
            humidity: rng.random_range(0.3..0.8),
            soil_moisture: rng.random_range(0.2..0.6),
            nutrients: rng.random_range(0.4..1.0),
            vegetation: rng.random_range(0.1..0.5),
        };

        let written = paint_patch(field, (cx, cy), radius, &profile);
        debug!(cx, cy, radius, cells = written, "Seeded patch");
        cells_written = cells_written.saturating_add(written);
        centres.push((cx, cy));
    }

    let summary = SeedSummary {
        centres,
        cells_written,
        active_chunks: field.active_chunk_count(),
    };
    info!(
        patches = config.patches,
        cells_written = summary.cells_written,
        active_chunks = summary.active_chunks,
        "Field seeded"
    );
    summary
}

fn paint_patch(field: &mut Field, (cx, cy): (u32, u32), radius: i32, profile: &PatchProfile) -> u64 {
    let reach = f64::from(radius).max(0.0) + 1.0;
    let mut written: u64 = 0;

    for dy in radius.saturating_neg()..=radius {
        for dx in radius.saturating_neg()..=radius {
            let distance = f64::from(dx).hypot(f64::from(dy));
            if distance > f64::from(radius) {
                continue;
            }
            let falloff = 1.0 - distance / reach;
            let x = i64::from(cx).saturating_add(i64::from(dx));
            let y = i64::from(cy).saturating_add(i64::from(dy));

            field.add(x, y, Layer::Elevation, narrow(profile.elevation * falloff));
            field.add(x, y, Layer::SoilMoisture, narrow(profile.soil_moisture * falloff));
            field.add(x, y, Layer::Nutrients, narrow(profile.nutrients * falloff));
            field.add(x, y, Layer::Vegetation, narrow(profile.vegetation * falloff));
            field.set(x, y, Layer::Temperature, narrow(profile.temperature));
            field.set(x, y, Layer::Humidity, narrow(profile.humidity * falloff));
            written = written.saturating_add(1);
        }
    }
    written
}

#[allow(clippy::cast_possible_truncation)]
const fn narrow(value: f64) -> f32 {
    value as f32
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn config(patches: u32, patch_radius: u32) -> SeedingConfig {
        SeedingConfig {
            patches,
            patch_radius,
        }
    }

    #[test]
    fn same_seed_same_field() {
        let mut a = Field::new(256, 256, 32).unwrap();
        let mut b = Field::new(256, 256, 32).unwrap();

        let first = seed_field(&mut a, &config(3, 10), 7);
        let second = seed_field(&mut b, &config(3, 10), 7);

        assert_eq!(first, second);
        assert_eq!(
            a.statistics(Layer::Vegetation),
            b.statistics(Layer::Vegetation)
        );
    }

    #[test]
    fn patch_centre_is_fully_painted() {
        let mut field = Field::new(256, 256, 32).unwrap();
        let summary = seed_field(&mut field, &config(1, 4), 11);

        let (cx, cy) = summary.centres.first().copied().unwrap();
        let (x, y) = (i64::from(cx), i64::from(cy));
        assert!(field.get(x, y, Layer::Elevation) >= 50.0);
        assert!(field.get(x, y, Layer::Vegetation) > 0.0);
        assert!(field.get(x, y, Layer::Temperature) >= 8.0);
        // A radius-4 disc covers 49 cells.
        assert_eq!(summary.cells_written, 49);
    }

    #[test]
    fn patches_allocate_only_what_they_cover() {
        let mut field = Field::new(1024, 1024, 64).unwrap();
        let summary = seed_field(&mut field, &config(2, 8), 3);

        // A 17-cell-wide disc touches at most 4 chunks of 64.
        assert!(summary.active_chunks >= 1);
        assert!(summary.active_chunks <= 8);
        assert_eq!(summary.active_chunks, field.active_chunk_count());
    }

    #[test]
    fn patches_wrap_across_edges() {
        let mut field = Field::new(64, 64, 16).unwrap();
        let summary = seed_field(&mut field, &config(1, 40), 5);

        // Radius beyond half the world touches every chunk.
        assert_eq!(field.active_chunk_count(), 16);
        assert!(summary.cells_written > 64 * 64);
    }

    #[test]
    fn zero_patches_leave_field_empty() {
        let mut field = Field::new(64, 64, 16).unwrap();
        let summary = seed_field(&mut field, &config(0, 8), 1);

        assert!(summary.centres.is_empty());
        assert_eq!(field.active_chunk_count(), 0);
    }
}
