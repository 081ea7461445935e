// Snapshot File Storage
// Serializes both metric mappings into one JSON document on disk

use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Point-in-time copy of the aggregation store
///
/// Ordered maps keep the on-disk key order stable between saves.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, i64>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}

/// Older snapshots may carry `null` for an empty section
#[derive(Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    gauges: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    counters: Option<BTreeMap<String, i64>>,
}

impl From<SnapshotDocument> for Snapshot {
    fn from(doc: SnapshotDocument) -> Self {
        Self {
            gauges: doc.gauges.unwrap_or_default(),
            counters: doc.counters.unwrap_or_default(),
        }
    }
}

/// Reads and writes the snapshot file
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render a snapshot with three-space indentation
    pub fn render(snapshot: &Snapshot) -> Result<Vec<u8>, PersistenceError> {
        let mut out = Vec::with_capacity(64 + snapshot.len() * 32);
        let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"   "));
        snapshot
            .serialize(&mut serializer)
            .map_err(PersistenceError::Serialize)?;
        Ok(out)
    }

    /// Write the snapshot through a temp file in the target directory
    ///
    /// The rename is the commit point: a failed write leaves the previous
    /// snapshot in place and never a truncated one.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let bytes = Self::render(snapshot)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source: std::io::Error| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };

        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut temp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        temp.as_file_mut().write_all(&bytes).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!(
            path = %self.path.display(),
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            bytes = bytes.len(),
            "Snapshot written"
        );
        Ok(())
    }

    /// Read the snapshot; a missing file is an empty store
    pub fn load(&self) -> Result<Snapshot, PersistenceError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot on disk, starting empty");
                return Ok(Snapshot::default());
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let doc: SnapshotDocument =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(doc.into())
    }
}
