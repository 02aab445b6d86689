use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StateStore;
use crate::core::Result;

/// One persisted entry: the state a plan last reached and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateEntry {
    state: String,
    updated_at: DateTime<Utc>,
}

/// File-backed state store.
///
/// The whole store is one JSON document, rewritten atomically on every
/// update: the new content goes to a temporary file in the same directory
/// which is then persisted over the target, so a crash mid-write leaves the
/// previous document intact.
pub struct FileStateStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, StateEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = std::fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, entries: &BTreeMap<String, StateEntry>) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, entries)?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard.lock()?;
        Ok(self.load()?.get(key).map(|e| e.state.clone()))
    }

    fn set_value(&self, key: &str, expected_old: &str, new_value: &str) -> Result<bool> {
        let _guard = self.guard.lock()?;
        let mut entries = self.load()?;
        let current = entries.get(key).map(|e| e.state.as_str()).unwrap_or("");
        if current != expected_old {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StateEntry {
                state: new_value.to_string(),
                updated_at: Utc::now(),
            },
        );
        self.save(&entries)?;
        Ok(true)
    }
}
