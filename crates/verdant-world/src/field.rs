//! The demand-paged, multi-layer environment field.
//!
//! The field models a torus of `width x height` cells, each carrying
//! [`LAYER_COUNT`] scalar channels. At the target scale (~7000 x 7000 cells x
//! 21 layers, about 1e9 scalars) dense allocation is out of the question, so
//! storage is paged in square [`Chunk`]s that only exist once something has
//! been written into them.
//!
//! # Rules
//!
//! - Every `(x, y)` is wrapped with Euclidean modulo before it reaches chunk
//!   math; the world has no edges and negative coordinates are valid.
//! - Plain reads never allocate. A missing chunk reads as `0.0`.
//! - Chunks are never evicted.
//! - Bulk traversal goes through [`Field::for_each_active_chunk`] or its
//!   mutable twin. Looping over the full `width x height` extent defeats the
//!   paging and must not be done in simulation code.

use std::collections::BTreeMap;

use serde::Serialize;
use verdant_types::{LAYER_COUNT, Layer};

use crate::chunk::{Chunk, ChunkCoord};
use crate::error::FieldError;

/// Default chunk side length in cells.
pub const DEFAULT_CHUNK_SIZE: u32 = 256;

/// Largest accepted chunk side length in cells.
pub const MAX_CHUNK_SIZE: u32 = 4096;

/// Min/max/mean of one layer over the allocated part of the field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerStatistics {
    /// The layer these statistics describe.
    pub layer: Layer,
    /// Smallest value seen.
    pub min: f32,
    /// Largest value seen.
    pub max: f32,
    /// Arithmetic mean over all sampled cells.
    pub mean: f64,
    /// Number of cells sampled.
    pub samples: u64,
    /// Number of chunks sampled.
    pub chunks: usize,
}

/// Chunked, lazily allocated multi-layer scalar grid with torus topology.
#[derive(Debug, Clone)]
pub struct Field {
    width: u32,
    height: u32,
    chunk_size: u32,
    chunks: BTreeMap<ChunkCoord, Chunk>,
}

impl Field {
    /// Create an empty field.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::InvalidDimensions`] if any dimension is zero or
    /// `chunk_size` exceeds [`MAX_CHUNK_SIZE`].
    pub fn new(width: u32, height: u32, chunk_size: u32) -> Result<Self, FieldError> {
        if width == 0 || height == 0 || chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(FieldError::InvalidDimensions {
                width,
                height,
                chunk_size,
            });
        }
        Ok(Self {
            width,
            height,
            chunk_size,
            chunks: BTreeMap::new(),
        })
    }

    /// World width in cells.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// World height in cells.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Chunk side length in cells.
    pub const fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Number of chunks currently allocated.
    pub fn active_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes held by all chunk buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.chunks
            .values()
            .map(Chunk::allocated_bytes)
            .fold(0_usize, usize::saturating_add)
    }

    /// Wrap world coordinates onto the torus.
    pub fn wrap(&self, x: i64, y: i64) -> (u32, u32) {
        (wrap_axis(x, self.width), wrap_axis(y, self.height))
    }

    /// Split wrapped coordinates into a chunk key and in-chunk offsets.
    fn locate(&self, x: i64, y: i64) -> (ChunkCoord, u32, u32) {
        let (wx, wy) = self.wrap(x, y);
        let size = self.chunk_size;
        let coord = ChunkCoord::new(wx.checked_div(size).unwrap_or(0), wy.checked_div(size).unwrap_or(0));
        (coord, wx.checked_rem(size).unwrap_or(0), wy.checked_rem(size).unwrap_or(0))
    }

    /// Resolve or allocate the chunk with the given key.
    fn chunk_entry(&mut self, coord: ChunkCoord) -> &mut Chunk {
        let size = self.chunk_size;
        let valid_width = self
            .width
            .saturating_sub(coord.cx.saturating_mul(size));
        let valid_height = self
            .height
            .saturating_sub(coord.cy.saturating_mul(size));
        self.chunks.entry(coord).or_insert_with(|| {
            tracing::trace!(%coord, "Allocating field chunk");
            Chunk::new(coord, size, valid_width, valid_height)
        })
    }

    /// Read one layer of a cell. Never allocates; absent chunks read as 0.
    pub fn get(&self, x: i64, y: i64, layer: Layer) -> f32 {
        let (coord, lx, ly) = self.locate(x, y);
        self.chunks
            .get(&coord)
            .map_or(0.0, |chunk| chunk.get(lx, ly, layer))
    }

    /// Read one layer of a cell, allocating its chunk if it does not exist.
    pub fn get_or_allocate(&mut self, x: i64, y: i64, layer: Layer) -> f32 {
        let (coord, lx, ly) = self.locate(x, y);
        self.chunk_entry(coord).get(lx, ly, layer)
    }

    /// Write one layer of a cell, allocating its chunk on first write.
    pub fn set(&mut self, x: i64, y: i64, layer: Layer, value: f32) {
        let (coord, lx, ly) = self.locate(x, y);
        self.chunk_entry(coord).set(lx, ly, layer, value);
    }

    /// Add `delta` to one layer of a cell, allocating its chunk if needed.
    pub fn add(&mut self, x: i64, y: i64, layer: Layer, delta: f32) {
        let (coord, lx, ly) = self.locate(x, y);
        let chunk = self.chunk_entry(coord);
        let current = chunk.get(lx, ly, layer);
        chunk.set(lx, ly, layer, current + delta);
    }

    /// [`get`](Self::get) addressed by integer layer id.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::LayerOutOfRange`] if `layer` is not a valid id.
    pub fn get_by_index(&self, x: i64, y: i64, layer: usize) -> Result<f32, FieldError> {
        Ok(self.get(x, y, Layer::try_from(layer)?))
    }

    /// [`set`](Self::set) addressed by integer layer id.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::LayerOutOfRange`] if `layer` is not a valid id.
    pub fn set_by_index(&mut self, x: i64, y: i64, layer: usize, value: f32) -> Result<(), FieldError> {
        self.set(x, y, Layer::try_from(layer)?, value);
        Ok(())
    }

    /// [`add`](Self::add) addressed by integer layer id.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::LayerOutOfRange`] if `layer` is not a valid id.
    pub fn add_by_index(&mut self, x: i64, y: i64, layer: usize, delta: f32) -> Result<(), FieldError> {
        self.add(x, y, Layer::try_from(layer)?, delta);
        Ok(())
    }

    /// All layers of one cell, or `None` if its chunk is not allocated.
    pub fn cell(&self, x: i64, y: i64) -> Option<&[f32]> {
        let (coord, lx, ly) = self.locate(x, y);
        self.chunks.get(&coord)?.cell(lx, ly)
    }

    /// Whether the chunk holding `(x, y)` exists.
    pub fn is_allocated(&self, x: i64, y: i64) -> bool {
        let (coord, _, _) = self.locate(x, y);
        self.chunks.contains_key(&coord)
    }

    /// Look up a chunk by key.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Allocated chunks in key order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Visit every allocated chunk, in key order.
    pub fn for_each_active_chunk<F>(&self, mut f: F)
    where
        F: FnMut(ChunkCoord, &Chunk),
    {
        for (coord, chunk) in &self.chunks {
            f(*coord, chunk);
        }
    }

    /// Visit every allocated chunk mutably, in key order.
    pub fn for_each_active_chunk_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(ChunkCoord, &mut Chunk),
    {
        for (coord, chunk) in &mut self.chunks {
            f(*coord, chunk);
        }
    }

    /// Average of `layer` over a discretized disc centred on `(cx, cy)`.
    ///
    /// Diagnostic helper: reads through [`get`](Self::get), so cells in
    /// absent chunks count as 0. Not for hot-path simulation.
    pub fn region_average(&self, cx: i64, cy: i64, radius: u32, layer: Layer) -> f64 {
        let r = i64::from(radius);
        let r_squared = r.saturating_mul(r);
        let mut sum = 0.0_f64;
        let mut count: u64 = 0;

        for dy in -r..=r {
            for dx in -r..=r {
                let distance = dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy));
                if distance > r_squared {
                    continue;
                }
                sum += f64::from(self.get(cx.saturating_add(dx), cy.saturating_add(dy), layer));
                count = count.saturating_add(1);
            }
        }

        if count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / count as f64;
        mean
    }

    /// Min/max/mean of `layer` over allocated chunks only.
    ///
    /// Returns `None` when no chunk is allocated.
    pub fn statistics(&self, layer: Layer) -> Option<LayerStatistics> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0_f64;
        let mut samples: u64 = 0;

        for chunk in self.chunks.values() {
            for (lx, ly) in chunk.local_cells() {
                let value = chunk.get(lx, ly, layer);
                min = min.min(value);
                max = max.max(value);
                sum += f64::from(value);
                samples = samples.saturating_add(1);
            }
        }

        if samples == 0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = sum / samples as f64;
        Some(LayerStatistics {
            layer,
            min,
            max,
            mean,
            samples,
            chunks: self.chunks.len(),
        })
    }

    /// Number of layers stored per cell.
    pub const fn layer_count(&self) -> usize {
        LAYER_COUNT
    }
}

/// Euclidean modulo of a signed coordinate onto `0..extent`.
fn wrap_axis(value: i64, extent: u32) -> u32 {
    let wrapped = value.rem_euclid(i64::from(extent.max(1)));
    u32::try_from(wrapped).unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn small_field() -> Field {
        Field::new(100, 60, 16).unwrap()
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            Field::new(0, 10, 4),
            Err(FieldError::InvalidDimensions { width: 0, .. })
        ));
        assert!(Field::new(10, 10, 0).is_err());
    }

    #[test]
    fn oversized_chunks_are_rejected() {
        assert!(matches!(
            Field::new(100, 100, u32::MAX),
            Err(FieldError::InvalidDimensions { chunk_size: u32::MAX, .. })
        ));
        assert!(Field::new(100, 100, MAX_CHUNK_SIZE + 1).is_err());

        let field = Field::new(100, 100, MAX_CHUNK_SIZE).unwrap();
        assert_eq!(field.chunk_size(), MAX_CHUNK_SIZE);
        assert_eq!(field.active_chunk_count(), 0);
    }

    #[test]
    fn unwritten_cell_reads_zero_without_allocating() {
        let field = small_field();
        assert_eq!(field.get(42, 17, Layer::Temperature), 0.0);
        assert_eq!(field.active_chunk_count(), 0);
        assert!(field.cell(42, 17).is_none());
    }

    #[test]
    fn first_write_allocates_exactly_one_chunk() {
        let mut field = small_field();
        field.set(3, 4, Layer::Humidity, 0.25);
        assert_eq!(field.active_chunk_count(), 1);
        assert_eq!(field.get(3, 4, Layer::Humidity), 0.25);

        field.set(5, 6, Layer::Humidity, 0.5);
        assert_eq!(field.active_chunk_count(), 1);

        field.set(40, 4, Layer::Humidity, 0.5);
        assert_eq!(field.active_chunk_count(), 2);
    }

    #[test]
    fn allocating_read_materializes_chunk() {
        let mut field = small_field();
        assert_eq!(field.get_or_allocate(70, 30, Layer::Light), 0.0);
        assert_eq!(field.active_chunk_count(), 1);
        assert!(field.is_allocated(70, 30));
    }

    #[test]
    fn coordinates_wrap_on_both_axes() {
        let mut field = small_field();
        field.set(7, 9, Layer::Nutrients, 3.5);
        for k in [-3_i64, -1, 1, 2, 1000] {
            assert_eq!(field.get(7 + k * 100, 9, Layer::Nutrients), 3.5);
            assert_eq!(field.get(7, 9 + k * 60, Layer::Nutrients), 3.5);
        }
        assert_eq!(field.wrap(-1, -1), (99, 59));
    }

    #[test]
    fn add_accumulates() {
        let mut field = small_field();
        field.add(1, 1, Layer::Scent, 1.5);
        field.add(101, 61, Layer::Scent, 2.0);
        assert_eq!(field.get(1, 1, Layer::Scent), 3.5);
    }

    #[test]
    fn layer_index_is_validated() {
        let mut field = small_field();
        assert_eq!(
            field.set_by_index(0, 0, 21, 1.0),
            Err(FieldError::LayerOutOfRange { index: 21 })
        );
        assert_eq!(field.active_chunk_count(), 0);
        field.set_by_index(0, 0, 1, 0.75).unwrap();
        assert_eq!(field.get_by_index(0, 0, 1).unwrap(), 0.75);
        assert!(field.get_by_index(0, 0, 99).is_err());
    }

    #[test]
    fn cell_exposes_all_layers() {
        let mut field = small_field();
        field.set(10, 10, Layer::Temperature, 21.0);
        field.set(10, 10, Layer::Scent, 2.0);
        let cell = field.cell(10, 10).unwrap();
        assert_eq!(cell.len(), LAYER_COUNT);
        assert_eq!(cell[Layer::Temperature.index()], 21.0);
        assert_eq!(cell[Layer::Scent.index()], 2.0);
    }

    #[test]
    fn iteration_visits_only_allocated_chunks() {
        let mut field = small_field();
        field.set(0, 0, Layer::Oxygen, 1.0);
        field.set(99, 59, Layer::Oxygen, 1.0);

        let mut coords = Vec::new();
        field.for_each_active_chunk(|coord, _| coords.push(coord));
        assert_eq!(coords, vec![ChunkCoord::new(0, 0), ChunkCoord::new(6, 3)]);

        field.for_each_active_chunk_mut(|_, chunk| chunk.data_mut().fill(2.0));
        assert_eq!(field.get(0, 0, Layer::Oxygen), 2.0);
    }

    #[test]
    fn edge_chunk_reports_partial_extent() {
        let mut field = small_field();
        field.set(99, 59, Layer::Oxygen, 1.0);
        let chunk = field.chunk(ChunkCoord::new(6, 3)).unwrap();
        // 100 = 6 * 16 + 4, 60 = 3 * 16 + 12
        assert_eq!(chunk.valid_extent(), (4, 12));
    }

    #[test]
    fn statistics_cover_allocated_cells_only() {
        let mut field = Field::new(64, 64, 8).unwrap();
        assert!(field.statistics(Layer::Temperature).is_none());

        field.set(0, 0, Layer::Temperature, 10.0);
        field.set(1, 0, Layer::Temperature, -2.0);
        let stats = field.statistics(Layer::Temperature).unwrap();
        assert_eq!(stats.samples, 64);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.min, -2.0);
        assert_eq!(stats.max, 10.0);
        assert!((stats.mean - 8.0 / 64.0).abs() < 1e-12);
    }

    #[test]
    fn region_average_counts_absent_cells_as_zero() {
        let mut field = Field::new(32, 32, 8).unwrap();
        field.set(16, 16, Layer::Vegetation, 5.0);
        // radius 1 disc: centre plus 4 orthogonal neighbours
        let average = field.region_average(16, 16, 1, Layer::Vegetation);
        assert!((average - 1.0).abs() < 1e-12);
        assert_eq!(field.region_average(16, 16, 0, Layer::Vegetation), 5.0);
        assert_eq!(field.active_chunk_count(), 1);
    }

    #[test]
    fn region_average_wraps_around_edges() {
        let mut field = Field::new(10, 10, 4).unwrap();
        field.set(0, 0, Layer::Biomass, 5.0);
        field.set(9, 0, Layer::Biomass, 5.0);
        let average = field.region_average(0, 0, 1, Layer::Biomass);
        assert!((average - 2.0).abs() < 1e-12);
    }

    #[test]
    fn allocated_bytes_track_chunk_count() {
        let mut field = Field::new(64, 64, 8).unwrap();
        assert_eq!(field.allocated_bytes(), 0);
        field.set(0, 0, Layer::Light, 1.0);
        field.set(63, 63, Layer::Light, 1.0);
        assert_eq!(field.allocated_bytes(), 2 * 8 * 8 * LAYER_COUNT * 4);
    }
}
