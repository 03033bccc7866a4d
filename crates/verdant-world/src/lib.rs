//! Environment field and environmental update for the Verdant simulation kernel.
//!
//! This crate models the physical substrate every subsystem reads and
//! writes: a torus of cells carrying a fixed set of scalar layers, stored in
//! lazily allocated chunks, plus the deterministic per-tick routine that
//! advances light, water, and wind.
//!
//! # Modules
//!
//! - [`chunk`] -- Fixed-size tiles holding all layers of their cells in one
//!   flat buffer.
//! - [`field`] -- The demand-paged [`Field`] with torus addressing,
//!   active-chunk iteration, and diagnostics.
//! - [`environment`] -- Solar cycle, water cycle, and procedural wind.
//! - [`diffusion`] -- Optional neighbour-averaging pass over active cells.
//! - [`error`] -- Error types for field construction and addressing.

pub mod chunk;
pub mod diffusion;
pub mod environment;
pub mod error;
pub mod field;

// Re-export primary types at crate root.
pub use chunk::{Chunk, ChunkCoord};
pub use diffusion::DiffusionSettings;
pub use environment::{EnvironmentReport, EnvironmentSystem};
pub use error::FieldError;
pub use field::{DEFAULT_CHUNK_SIZE, Field, LayerStatistics, MAX_CHUNK_SIZE};
