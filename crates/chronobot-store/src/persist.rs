//! The durable-store boundary: snapshot load/save.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Persistence boundary consumed by the engine.
///
/// Saves are last-write-wins whole-snapshot overwrites; a failed save is
/// logged by the caller and never retried automatically.
pub trait DurableStore: Send + Sync {
    /// Load the persisted snapshot, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Snapshot>>;

    /// Overwrite the persisted snapshot.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Snapshot persistence as a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableStore for JsonSnapshotFile {
    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.is_file() {
            info!(path = %self.path.display(), "no save file found");
            return Ok(None);
        }
        info!(path = %self.path.display(), "save file found");
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "snapshot saved");
        Ok(())
    }
}
