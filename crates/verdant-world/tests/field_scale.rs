//! Field behaviour at full world size and across whole day cycles.
//!
//! These exercise the paths that only matter at scale: a 7000x7000 torus
//! must stay sparse, and the environment must never touch cells that were
//! not written.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::arithmetic_side_effects)]

use verdant_types::Layer;
use verdant_world::environment::{DAY_LENGTH_TICKS, is_daytime};
use verdant_world::{DEFAULT_CHUNK_SIZE, DiffusionSettings, EnvironmentSystem, Field};

const SIDE: u32 = 7000;

fn full_size_field() -> Field {
    Field::new(SIDE, SIDE, DEFAULT_CHUNK_SIZE).unwrap()
}

#[test]
fn sparse_writes_stay_sparse() {
    let mut field = full_size_field();
    field.set(0, 0, Layer::Elevation, 12.0);
    field.set(3500, 3500, Layer::Elevation, 40.0);
    field.set(6999, 6999, Layer::Elevation, 7.0);

    assert_eq!(field.active_chunk_count(), 3);
    // Three chunks of 256x256 cells, 21 f32 layers each.
    assert_eq!(field.allocated_bytes(), 3 * 256 * 256 * 21 * 4);
    assert_eq!(field.get(1234, 4321, Layer::Elevation), 0.0);
    assert_eq!(field.active_chunk_count(), 3);
}

#[test]
fn every_multiple_of_the_extent_aliases_the_same_cell() {
    let mut field = full_size_field();
    let w = i64::from(SIDE);
    field.set(17, 29, Layer::Scent, 0.5);

    for kx in -3_i64..=3 {
        for ky in -3_i64..=3 {
            let x = 17 + kx * w;
            let y = 29 + ky * w;
            assert_eq!(field.get(x, y, Layer::Scent), 0.5, "({x}, {y})");
        }
    }
    assert_eq!(field.active_chunk_count(), 1);
}

#[test]
fn environment_leaves_unwritten_world_untouched() {
    let mut field = full_size_field();
    field.set(100, 100, Layer::SoilMoisture, 0.4);
    let env = EnvironmentSystem::new(DiffusionSettings::default());

    let report = env.apply(&mut field, 1200);

    assert_eq!(report.chunks_visited, 1);
    assert_eq!(report.cells_visited, 256 * 256);
    assert_eq!(field.active_chunk_count(), 1);
    assert_eq!(field.get(5000, 5000, Layer::Light), 0.0);
    assert!(field.get(100, 100, Layer::Light) > 0.0);
}

#[test]
fn light_follows_the_day_across_a_full_cycle() {
    let mut field = Field::new(32, 32, 16).unwrap();
    field.set(4, 4, Layer::Temperature, 15.0);
    let env = EnvironmentSystem::new(DiffusionSettings::default());

    for tick in 1..=DAY_LENGTH_TICKS {
        let report = env.apply(&mut field, tick);
        let light = field.get(4, 4, Layer::Light);
        assert_eq!(report.daytime, is_daytime(tick));
        if report.daytime {
            assert!(light > 0.0, "tick {tick}");
        } else {
            assert_eq!(light, 0.0, "tick {tick}");
            assert_eq!(field.get(4, 4, Layer::Ultraviolet), 0.0);
        }
    }
}

#[test]
fn diffusion_spreads_heat_only_within_active_chunks() {
    let mut field = Field::new(64, 64, 16).unwrap();
    field.set(8, 8, Layer::Temperature, 100.0);
    let env = EnvironmentSystem::new(DiffusionSettings::new(0.5, [Layer::Temperature]));

    // Night tick: no solar heating.
    let report = env.apply(&mut field, 0);

    assert!(report.cells_diffused > 0);
    assert!(field.get(9, 8, Layer::Temperature) > 0.0);
    assert!(field.get(8, 8, Layer::Temperature) < 100.0);
    assert_eq!(field.active_chunk_count(), 1);
}
