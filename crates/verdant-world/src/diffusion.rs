//! Neighbour-averaging blend pass over the active part of the field.
//!
//! For every in-world cell of every allocated chunk and every configured
//! layer, the value moves toward the mean of its four orthogonal neighbours:
//!
//! ```text
//! next = value + rate * (mean(north, south, east, west) - value)
//! ```
//!
//! Neighbours are read with torus wrapping; neighbours in chunks that are
//! not allocated read as 0, so values bleed out at the edge of the active
//! region. The pass never allocates. All new values are computed from the
//! pre-pass state before any is written back, which makes the result
//! independent of chunk visiting order.

use serde::{Deserialize, Serialize};
use verdant_types::Layer;

use crate::chunk::{Chunk, ChunkCoord};
use crate::field::Field;

/// Tunables for the diffusion pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffusionSettings {
    /// Blend rate in `0.0..=1.0`; 0 disables the pass.
    pub rate: f32,
    /// Layers to diffuse.
    pub layers: Vec<Layer>,
}

impl DiffusionSettings {
    /// Diffuse `layers` at `rate`.
    pub fn new(rate: f32, layers: impl IntoIterator<Item = Layer>) -> Self {
        Self {
            rate,
            layers: layers.into_iter().collect(),
        }
    }

    /// Whether the pass would change anything.
    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0 && !self.layers.is_empty()
    }
}

/// New values for one chunk, `cells x layers`, in local cell order.
struct StagedChunk {
    coord: ChunkCoord,
    values: Vec<f32>,
}

/// Run the diffusion pass. Returns the number of cells updated.
pub fn apply(field: &mut Field, settings: &DiffusionSettings) -> u64 {
    if !settings.is_enabled() {
        return 0;
    }
    let rate = settings.rate.min(1.0);

    let mut staged: Vec<StagedChunk> = Vec::with_capacity(field.active_chunk_count());
    field.for_each_active_chunk(|coord, chunk| {
        let mut values = Vec::new();
        for (lx, ly) in chunk.local_cells() {
            for &layer in &settings.layers {
                let value = chunk.get(lx, ly, layer);
                let mean = neighbour_mean(field, chunk, lx, ly, layer);
                values.push(value + rate * (mean - value));
            }
        }
        staged.push(StagedChunk { coord, values });
    });

    // Both passes walk the same map in key order.
    let mut stages = staged.into_iter();
    let mut cells: u64 = 0;
    let layer_count = settings.layers.len();
    field.for_each_active_chunk_mut(|coord, chunk| {
        let Some(stage) = stages.next() else {
            return;
        };
        if stage.coord != coord {
            return;
        }
        let positions: Vec<(u32, u32)> = chunk.local_cells().collect();
        for (position, (lx, ly)) in positions.into_iter().enumerate() {
            let start = position.saturating_mul(layer_count);
            for (offset, &layer) in settings.layers.iter().enumerate() {
                if let Some(&value) = stage.values.get(start.saturating_add(offset)) {
                    chunk.set(lx, ly, layer, value);
                }
            }
            cells = cells.saturating_add(1);
        }
    });

    cells
}

/// Mean of the four orthogonal neighbours of a local cell.
///
/// Neighbours inside the chunk's in-world extent are read from the buffer
/// directly; the rest go through the field with wrapping.
fn neighbour_mean(field: &Field, chunk: &Chunk, lx: u32, ly: u32, layer: Layer) -> f32 {
    let (origin_x, origin_y) = chunk.origin();
    let (valid_width, valid_height) = chunk.valid_extent();
    let world_x = i64::from(origin_x).saturating_add(i64::from(lx));
    let world_y = i64::from(origin_y).saturating_add(i64::from(ly));

    let sample = |dx: i64, dy: i64| -> f32 {
        let nx = i64::from(lx).saturating_add(dx);
        let ny = i64::from(ly).saturating_add(dy);
        let inside = nx >= 0 && ny >= 0 && nx < i64::from(valid_width) && ny < i64::from(valid_height);
        if inside {
            let local_x = u32::try_from(nx).unwrap_or(0);
            let local_y = u32::try_from(ny).unwrap_or(0);
            chunk.get(local_x, local_y, layer)
        } else {
            field.get(world_x.saturating_add(dx), world_y.saturating_add(dy), layer)
        }
    };

    (sample(0, -1) + sample(0, 1) + sample(1, 0) + sample(-1, 0)) / 4.0
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn disabled_settings_do_nothing() {
        let mut field = Field::new(8, 8, 8).unwrap();
        field.set(4, 4, Layer::Temperature, 8.0);
        assert_eq!(apply(&mut field, &DiffusionSettings::default()), 0);
        assert_eq!(
            apply(&mut field, &DiffusionSettings::new(0.0, [Layer::Temperature])),
            0
        );
        assert_eq!(field.get(4, 4, Layer::Temperature), 8.0);
    }

    #[test]
    fn hot_spot_spreads_to_neighbours() {
        let mut field = Field::new(8, 8, 8).unwrap();
        field.set(4, 4, Layer::Temperature, 8.0);
        let settings = DiffusionSettings::new(0.5, [Layer::Temperature]);
        let cells = apply(&mut field, &settings);

        assert_eq!(cells, 64);
        // centre: 8 + 0.5 * (0 - 8)
        assert_eq!(field.get(4, 4, Layer::Temperature), 4.0);
        // neighbour: 0 + 0.5 * (8 / 4 - 0)
        assert_eq!(field.get(5, 4, Layer::Temperature), 1.0);
        assert_eq!(field.get(4, 3, Layer::Temperature), 1.0);
        assert_eq!(field.get(6, 4, Layer::Temperature), 0.0);
    }

    #[test]
    fn only_configured_layers_change() {
        let mut field = Field::new(8, 8, 8).unwrap();
        field.set(4, 4, Layer::Temperature, 8.0);
        field.set(4, 4, Layer::Humidity, 0.8);
        apply(&mut field, &DiffusionSettings::new(1.0, [Layer::Temperature]));
        assert_eq!(field.get(4, 4, Layer::Humidity), 0.8);
    }

    #[test]
    fn neighbours_cross_chunk_boundaries() {
        let mut field = Field::new(16, 16, 8).unwrap();
        field.set(7, 0, Layer::Scent, 4.0);
        field.set(8, 0, Layer::Scent, 0.0);
        apply(&mut field, &DiffusionSettings::new(1.0, [Layer::Scent]));
        assert_eq!(field.get(8, 0, Layer::Scent), 1.0);
    }

    #[test]
    fn absent_neighbours_count_as_zero_and_stay_absent() {
        let mut field = Field::new(16, 16, 8).unwrap();
        field.set(7, 0, Layer::Scent, 4.0);
        apply(&mut field, &DiffusionSettings::new(1.0, [Layer::Scent]));
        assert_eq!(field.active_chunk_count(), 1);
        assert_eq!(field.get(8, 0, Layer::Scent), 0.0);
        assert_eq!(field.get(7, 0, Layer::Scent), 0.0);
    }

    #[test]
    fn wraps_across_world_edge() {
        let mut field = Field::new(8, 8, 8).unwrap();
        field.set(0, 0, Layer::Oxygen, 4.0);
        apply(&mut field, &DiffusionSettings::new(1.0, [Layer::Oxygen]));
        assert_eq!(field.get(7, 0, Layer::Oxygen), 1.0);
        assert_eq!(field.get(0, 7, Layer::Oxygen), 1.0);
    }
}
