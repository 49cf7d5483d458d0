//! Durable set of business keys already processed in the current run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, ResultExt};
use crate::integrity::{checksum_keys, verify_keys};
use crate::storage::{read_json, remove_if_exists, write_json_atomic};

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(alias = "procesados")]
    processed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

/// Checkpoint store backed by a single JSON file.
///
/// The in-memory set only grows between `load_existing` and `clear`;
/// `flush` writes it atomically.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    processed: BTreeSet<String>,
    dirty: bool,
}

impl CheckpointStore {
    /// A store with an empty key set. Nothing is read from disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            processed: BTreeSet::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load keys persisted by an earlier, unfinished run.
    ///
    /// Losing the checkpoint only costs re-verification, so any unreadable,
    /// malformed or checksum-failing file yields an empty set.
    pub fn load_existing(&mut self) -> &BTreeSet<String> {
        match read_json::<CheckpointFile>(&self.path) {
            Ok(Some(file)) => {
                let keys: BTreeSet<String> = file.processed.into_iter().collect();
                let intact = match file.checksum.as_deref() {
                    Some(expected) => verify_keys(keys.iter().map(String::as_str), expected),
                    None => true,
                };
                if intact {
                    tracing::info!(
                        "Checkpoint loaded: {} keys already processed",
                        keys.len()
                    );
                    self.processed.extend(keys);
                } else {
                    tracing::warn!(
                        "Checkpoint {} failed integrity check; re-verifying everything",
                        self.path.display()
                    );
                }
            }
            Ok(None) => {
                tracing::info!("No checkpoint at {}", self.path.display());
            }
            Err(e) => {
                tracing::warn!(
                    "Checkpoint {} unreadable ({}); re-verifying everything",
                    self.path.display(),
                    e
                );
            }
        }
        &self.processed
    }

    pub fn is_processed(&self, key: &str) -> bool {
        self.processed.contains(key)
    }

    /// Record a key as processed. Marking an existing key is a no-op.
    pub fn mark_processed(&mut self, key: &str) {
        if self.processed.insert(key.to_string()) {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.processed.iter().map(String::as_str)
    }

    /// Durably write the current key set.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        let file = CheckpointFile {
            processed: self.processed.iter().cloned().collect(),
            updated_at: Some(Utc::now()),
            checksum: Some(checksum_keys(self.keys())),
        };
        write_json_atomic(&self.path, &file)
            .with_context(|| format!("flushing checkpoint {}", self.path.display()))?;
        self.dirty = false;
        tracing::debug!("Checkpoint flushed: {} keys", self.processed.len());
        Ok(())
    }

    /// Whether keys were marked since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forget every key and delete the file; the next run starts fresh.
    pub fn clear(&mut self) -> Result<(), PipelineError> {
        self.processed.clear();
        self.dirty = false;
        remove_if_exists(&self.path)
            .with_context(|| format!("clearing checkpoint {}", self.path.display()))
    }
}
