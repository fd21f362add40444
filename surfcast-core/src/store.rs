//! Snapshot storage: one current forecast per kind.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{
    error::{ForecastError, StoreError},
    model::{Forecast, ForecastKind},
};

/// Key of the slot every kind's forecast is written to.
pub const SINGLETON_KEY: &str = "default_forecast";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created { key: String },
    Replaced { key: String },
}

impl UpsertOutcome {
    pub fn key(&self) -> &str {
        match self {
            UpsertOutcome::Created { key } | UpsertOutcome::Replaced { key } => key,
        }
    }
}

/// Entity storage keyed by (kind, key).
///
/// Implementations provide the primitives; `upsert` and `latest` are the
/// operations the pipeline and readers use. A single `put` must replace an
/// entity atomically so a failed write leaves the previous one intact.
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// Keys stored for `kind`, in ascending order.
    fn keys(&self, kind: ForecastKind) -> Result<Vec<String>, StoreError>;

    fn get(&self, kind: ForecastKind, key: &str) -> Result<Option<Forecast>, StoreError>;

    fn put(&self, kind: ForecastKind, key: &str, forecast: &Forecast) -> Result<(), StoreError>;

    fn count(&self, kind: ForecastKind) -> Result<usize, StoreError> {
        Ok(self.keys(kind)?.len())
    }

    /// Replace the stored forecast for `kind`, or create it.
    ///
    /// An existing entity keeps its key so readers always address the same
    /// slot. More than one entity is an inconsistency: only the first is
    /// overwritten.
    fn upsert(&self, kind: ForecastKind, forecast: &Forecast) -> Result<UpsertOutcome, StoreError> {
        let keys = self.keys(kind)?;
        if keys.len() > 1 {
            warn!(
                kind = %kind,
                count = keys.len(),
                "more than one stored forecast, overwriting the first"
            );
        }

        match keys.into_iter().next() {
            Some(key) => {
                self.put(kind, &key, forecast)?;
                Ok(UpsertOutcome::Replaced { key })
            }
            None => {
                self.put(kind, SINGLETON_KEY, forecast)?;
                Ok(UpsertOutcome::Created {
                    key: SINGLETON_KEY.to_string(),
                })
            }
        }
    }

    /// The current forecast for `kind`.
    fn latest(&self, kind: ForecastKind) -> Result<Forecast, ForecastError> {
        for key in self.keys(kind)? {
            if let Some(forecast) = self.get(kind, &key)? {
                return Ok(forecast);
            }
        }
        Err(ForecastError::NoForecastAvailable(kind))
    }
}

/// In-process store, shared by many readers.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slots: RwLock<HashMap<ForecastKind, BTreeMap<String, Forecast>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn keys(&self, kind: ForecastKind) -> Result<Vec<String>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots
            .get(&kind)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn get(&self, kind: ForecastKind, key: &str) -> Result<Option<Forecast>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(&kind).and_then(|m| m.get(key)).cloned())
    }

    fn put(&self, kind: ForecastKind, key: &str, forecast: &Forecast) -> Result<(), StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        slots
            .entry(kind)
            .or_default()
            .insert(key.to_string(), forecast.clone());
        Ok(())
    }
}

/// Store of JSON documents laid out as `<root>/<kind>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: ForecastKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn entity_path(&self, kind: ForecastKind, key: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn keys(&self, kind: ForecastKind) -> Result<Vec<String>, StoreError> {
        let dir = self.kind_dir(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();

        Ok(keys)
    }

    fn get(&self, kind: ForecastKind, key: &str) -> Result<Option<Forecast>, StoreError> {
        let path = self.entity_path(kind, key);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|cause| StoreError::Corrupt { path, cause })
    }

    fn put(&self, kind: ForecastKind, key: &str, forecast: &Forecast) -> Result<(), StoreError> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let body = serde_json::to_vec_pretty(forecast).map_err(StoreError::Encode)?;
        let path = self.entity_path(kind, key);

        // Written beside the target and renamed over it, so readers see
        // either the old or the new document.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        debug!(path = %path.display(), bytes = body.len(), "stored forecast");
        Ok(())
    }
}
