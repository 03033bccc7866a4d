//! Shared type definitions for the Verdant simulation kernel.
//!
//! This crate holds the types every other crate in the workspace agrees on.
//! Types exported to `TypeScript` via `ts-rs` are the ones external
//! collaborators (dashboards, persistence adapters) read directly.
//!
//! # Modules
//!
//! - [`ids`] -- World and node identifiers
//! - [`layer`] -- The fixed catalogue of per-cell scalar channels
//! - [`snapshot`] -- End-of-tick snapshot payloads

pub mod ids;
pub mod layer;
pub mod snapshot;

pub use ids::{NodeId, WorldId};
pub use layer::{InvalidLayer, LAYER_COUNT, Layer};
pub use snapshot::{ComponentSnapshot, NodeSnapshot, WorldSnapshot};
