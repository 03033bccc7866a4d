//! Error types for the `verdant-world` crate.
//!
//! Field reads never fail: an absent chunk reads as zero. The only
//! failures are precondition violations at the API boundary.

use verdant_types::InvalidLayer;

/// Errors that can occur when building or addressing the field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// An integer layer id does not name a layer.
    #[error("layer index {index} is out of range")]
    LayerOutOfRange {
        /// The rejected layer id.
        index: usize,
    },

    /// World or chunk dimensions are unusable.
    #[error("invalid field dimensions {width}x{height} with chunk size {chunk_size}")]
    InvalidDimensions {
        /// Requested world width in cells.
        width: u32,
        /// Requested world height in cells.
        height: u32,
        /// Requested chunk side length in cells.
        chunk_size: u32,
    },
}

impl From<InvalidLayer> for FieldError {
    fn from(err: InvalidLayer) -> Self {
        Self::LayerOutOfRange { index: err.index }
    }
}
