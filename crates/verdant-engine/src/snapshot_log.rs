//! Snapshot sink used by the engine binary.
//!
//! Every snapshot is serialized to JSON and logged with its size. When a
//! directory is configured the JSON is also written to
//! `<dir>/<world_id>-<tick>.json`.

use std::path::PathBuf;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::info;
use verdant_core::{PersistenceError, SnapshotSink};
use verdant_types::WorldSnapshot;

/// Logs each snapshot and optionally writes it to disk.
#[derive(Debug, Clone, Default)]
pub struct LoggingSnapshotSink {
    directory: Option<PathBuf>,
}

impl LoggingSnapshotSink {
    /// A sink that only logs.
    pub const fn new() -> Self {
        Self { directory: None }
    }

    /// A sink that also writes one JSON file per tick into `directory`.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
        }
    }

    /// The file a snapshot is written to, if a directory is configured.
    pub fn path_for(&self, snapshot: &WorldSnapshot) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}-{:08}.json", snapshot.world_id, snapshot.tick)))
    }

    async fn persist(&self, snapshot: &WorldSnapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(snapshot)?;
        if let Some(path) = self.path_for(snapshot) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &bytes).await?;
        }
        info!(
            tick = snapshot.tick,
            nodes = snapshot.nodes.len(),
            bytes = bytes.len(),
            predictions = snapshot.predictions.is_some(),
            "Snapshot saved"
        );
        Ok(())
    }
}

impl SnapshotSink for LoggingSnapshotSink {
    fn save_snapshot<'a>(&'a self, snapshot: &'a WorldSnapshot) -> BoxFuture<'a, Result<(), PersistenceError>> {
        self.persist(snapshot).boxed()
    }
}
