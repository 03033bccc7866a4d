//! The snapshot persistence seam.
//!
//! At the end of every tick the orchestrator hands a [`WorldSnapshot`] to
//! the world's [`SnapshotSink`]. Storage backends live outside this crate;
//! the sinks here cover embedding and tests.

use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use verdant_types::WorldSnapshot;

/// Errors raised while persisting a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Building the snapshot failed.
    #[error("failed to serialize snapshot: {source}")]
    Serialize {
        /// The underlying serializer error.
        #[from]
        source: serde_json::Error,
    },

    /// Writing to the destination failed.
    #[error("failed to write snapshot: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The backend rejected the snapshot.
    #[error("snapshot backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Destination for end-of-tick snapshots.
pub trait SnapshotSink: Send + Sync {
    /// Persist one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the snapshot could not be stored. The
    /// orchestrator propagates it out of the tick.
    fn save_snapshot<'a>(&'a self, snapshot: &'a WorldSnapshot) -> BoxFuture<'a, Result<(), PersistenceError>>;
}

/// A sink that discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSnapshotSink;

impl SnapshotSink for NullSnapshotSink {
    fn save_snapshot<'a>(&'a self, _snapshot: &'a WorldSnapshot) -> BoxFuture<'a, Result<(), PersistenceError>> {
        futures::future::ready(Ok(())).boxed()
    }
}

/// A sink that keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotSink {
    snapshots: Mutex<Vec<WorldSnapshot>>,
}

impl MemorySnapshotSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots saved so far, oldest first.
    pub fn snapshots(&self) -> Vec<WorldSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Option<WorldSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of snapshots saved.
    pub fn len(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been saved yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn save_snapshot<'a>(&'a self, snapshot: &'a WorldSnapshot) -> BoxFuture<'a, Result<(), PersistenceError>> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        futures::future::ready(Ok(())).boxed()
    }
}
