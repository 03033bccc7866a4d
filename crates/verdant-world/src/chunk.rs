//! Fixed-size tiles of the environment field.
//!
//! A [`Chunk`] stores every layer of every cell it covers in one flat
//! buffer, row-major over cells and layer-minor within a cell:
//!
//! ```text
//! offset(local_x, local_y, layer) = (local_y * size + local_x) * LAYER_COUNT + layer
//! ```
//!
//! so the full environmental state of a cell is one contiguous slice.
//! Chunks on the right or bottom edge of a world whose dimensions are not a
//! multiple of the chunk size only partly overlap the world; the cells past
//! the edge are allocated but never visited.

use verdant_types::{LAYER_COUNT, Layer};

/// Integer coordinates of a chunk within the chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// Column in the chunk grid.
    pub cx: u32,
    /// Row in the chunk grid.
    pub cy: u32,
}

impl ChunkCoord {
    /// Create a chunk coordinate.
    pub const fn new(cx: u32, cy: u32) -> Self {
        Self { cx, cy }
    }
}

impl core::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.cx, self.cy)
    }
}

/// One lazily allocated tile of the field.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    coord: ChunkCoord,
    size: u32,
    origin_x: u32,
    origin_y: u32,
    valid_width: u32,
    valid_height: u32,
    data: Vec<f32>,
}

impl Chunk {
    /// Allocate a zeroed chunk.
    ///
    /// `valid_width`/`valid_height` bound the cells that lie inside the
    /// world; they are clamped to `size`.
    pub(crate) fn new(coord: ChunkCoord, size: u32, valid_width: u32, valid_height: u32) -> Self {
        let side = size as usize;
        let len = side
            .saturating_mul(side)
            .saturating_mul(LAYER_COUNT);
        Self {
            coord,
            size,
            origin_x: coord.cx.saturating_mul(size),
            origin_y: coord.cy.saturating_mul(size),
            valid_width: valid_width.min(size),
            valid_height: valid_height.min(size),
            data: vec![0.0; len],
        }
    }

    /// Coordinates of this chunk in the chunk grid.
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Side length in cells.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// World coordinates of the chunk's top-left cell.
    pub const fn origin(&self) -> (u32, u32) {
        (self.origin_x, self.origin_y)
    }

    /// Number of columns and rows of this chunk that lie inside the world.
    pub const fn valid_extent(&self) -> (u32, u32) {
        (self.valid_width, self.valid_height)
    }

    /// Number of in-world cells.
    pub const fn valid_cells(&self) -> u64 {
        (self.valid_width as u64).saturating_mul(self.valid_height as u64)
    }

    /// Raw buffer, row-major over cells and layer-minor within a cell.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw buffer.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Heap bytes held by the buffer.
    pub fn allocated_bytes(&self) -> usize {
        self.data.len().saturating_mul(core::mem::size_of::<f32>())
    }

    /// Buffer offset of the first layer of a local cell.
    fn cell_offset(&self, local_x: u32, local_y: u32) -> Option<usize> {
        if local_x >= self.size || local_y >= self.size {
            return None;
        }
        let side = self.size as usize;
        (local_y as usize)
            .checked_mul(side)?
            .checked_add(local_x as usize)?
            .checked_mul(LAYER_COUNT)
    }

    /// Read one layer of a local cell; 0 outside the chunk.
    pub fn get(&self, local_x: u32, local_y: u32, layer: Layer) -> f32 {
        self.cell(local_x, local_y)
            .and_then(|cell| cell.get(layer.index()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Write one layer of a local cell. Writes outside the chunk are dropped.
    pub fn set(&mut self, local_x: u32, local_y: u32, layer: Layer, value: f32) {
        if let Some(slot) = self
            .cell_mut(local_x, local_y)
            .and_then(|cell| cell.get_mut(layer.index()))
        {
            *slot = value;
        }
    }

    /// All layers of a local cell.
    pub fn cell(&self, local_x: u32, local_y: u32) -> Option<&[f32]> {
        let start = self.cell_offset(local_x, local_y)?;
        self.data.get(start..start.checked_add(LAYER_COUNT)?)
    }

    /// All layers of a local cell, mutably.
    pub fn cell_mut(&mut self, local_x: u32, local_y: u32) -> Option<&mut [f32]> {
        let start = self.cell_offset(local_x, local_y)?;
        let end = start.checked_add(LAYER_COUNT)?;
        self.data.get_mut(start..end)
    }

    /// Local coordinates of every in-world cell, row by row.
    pub fn local_cells(&self) -> impl Iterator<Item = (u32, u32)> + use<> {
        let width = self.valid_width;
        (0..self.valid_height).flat_map(move |ly| (0..width).map(move |lx| (lx, ly)))
    }

    /// Visit every in-world cell with its world coordinates and its layers.
    pub fn for_each_cell_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(u32, u32, &mut [f32]),
    {
        let (origin_x, origin_y) = self.origin();
        for (lx, ly) in self.local_cells() {
            if let Some(cell) = self.cell_mut(lx, ly) {
                f(origin_x.saturating_add(lx), origin_y.saturating_add(ly), cell);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cell_layers_are_contiguous() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 4, 4, 4);
        chunk.set(1, 2, Layer::Temperature, 11.0);
        chunk.set(1, 2, Layer::Humidity, 0.5);
        let cell = chunk.cell(1, 2).unwrap();
        assert_eq!(cell.len(), LAYER_COUNT);
        assert_eq!(cell[Layer::Temperature.index()], 11.0);
        assert_eq!(cell[Layer::Humidity.index()], 0.5);

        let start = (2 * 4 + 1) * LAYER_COUNT;
        assert_eq!(chunk.data()[start], 11.0);
        assert_eq!(chunk.data()[start + 1], 0.5);
    }

    #[test]
    fn out_of_chunk_access_is_inert() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 4, 4, 4);
        chunk.set(4, 0, Layer::Light, 1.0);
        assert_eq!(chunk.get(4, 0, Layer::Light), 0.0);
        assert!(chunk.cell(0, 4).is_none());
        assert!(chunk.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn partial_chunk_only_visits_valid_cells() {
        let mut chunk = Chunk::new(ChunkCoord::new(2, 1), 4, 3, 2);
        assert_eq!(chunk.origin(), (8, 4));
        assert_eq!(chunk.valid_cells(), 6);

        let mut seen = Vec::new();
        chunk.for_each_cell_mut(|x, y, _| seen.push((x, y)));
        assert_eq!(seen, vec![(8, 4), (9, 4), (10, 4), (8, 5), (9, 5), (10, 5)]);
    }

    #[test]
    fn allocated_bytes_cover_every_layer() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0), 8, 8, 8);
        assert_eq!(chunk.allocated_bytes(), 8 * 8 * LAYER_COUNT * 4);
    }
}
