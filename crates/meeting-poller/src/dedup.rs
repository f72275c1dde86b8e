//! Record of message ids that have already been handled.
//!
//! Stores only load and save whole sets; the pipeline works on an in-memory
//! [`ProcessedIds`] between the two. One process per state location.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::Result;

pub trait DedupStore: Send + Sync {
    /// Persisted ids, or an empty set when nothing usable is stored
    fn load(&self) -> HashSet<String>;

    /// Replace the persisted state with `ids`
    fn save(&self, ids: &HashSet<String>) -> Result<()>;
}

impl<T: DedupStore + ?Sized> DedupStore for Arc<T> {
    fn load(&self) -> HashSet<String> {
        (**self).load()
    }

    fn save(&self, ids: &HashSet<String>) -> Result<()> {
        (**self).save(ids)
    }
}

/// In-memory processed set. Ids are only ever added.
#[derive(Debug, Default, Clone)]
pub struct ProcessedIds {
    ids: HashSet<String>,
}

impl ProcessedIds {
    pub fn new(ids: HashSet<String>) -> Self {
        Self { ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present
    pub fn mark_processed(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_set(&self) -> &HashSet<String> {
        &self.ids
    }
}

/// JSON array of ids in a single file, rewritten on every save
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DedupStore for JsonFileStore {
    fn load(&self) -> HashSet<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No processed-id state at {}", self.path.display());
                return HashSet::new();
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return HashSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable processed-id state {}: {}",
                    self.path.display(),
                    e
                );
                HashSet::new()
            }
        }
    }

    fn save(&self, ids: &HashSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        let json = serde_json::to_string_pretty(&sorted)?;

        // Readers never observe a partially written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

/// Store that keeps state in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: Mutex<HashSet<String>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Mutex::new(ids.into_iter().map(Into::into).collect()),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> HashSet<String> {
        self.ids.lock().map(|ids| ids.clone()).unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|count| *count).unwrap_or_default()
    }
}

impl DedupStore for MemoryStore {
    fn load(&self) -> HashSet<String> {
        self.snapshot()
    }

    fn save(&self, ids: &HashSet<String>) -> Result<()> {
        if let Ok(mut stored) = self.ids.lock() {
            *stored = ids.clone();
        }
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("meeting-poller-test-{}", Uuid::new_v4()))
            .join("processed_ids.json")
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = JsonFileStore::new(temp_state_path());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_state_path();
        let store = JsonFileStore::new(&path);

        tokio_test::assert_ok!(store.save(&ids(&["3", "1", "2"])));
        assert_eq!(store.load(), ids(&["1", "2", "3"]));

        let on_disk = fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed, vec!["1", "2", "3"]);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_save_overwrites_previous_content() {
        let path = temp_state_path();
        let store = JsonFileStore::new(&path);

        store.save(&ids(&["a", "b", "c"])).unwrap();
        store.save(&ids(&["z"])).unwrap();
        assert_eq!(store.load(), ids(&["z"]));

        // Saving an unchanged set is harmless
        store.save(&ids(&["z"])).unwrap();
        assert_eq!(store.load(), ids(&["z"]));

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let path = temp_state_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().is_empty());

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_processed_ids_only_grow() {
        let mut processed = ProcessedIds::new(ids(&["1"]));
        assert!(processed.contains("1"));
        assert!(!processed.mark_processed("1"));
        assert!(processed.mark_processed("2"));
        assert_eq!(processed.len(), 2);
        assert!(processed.contains("2"));
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::with_ids(["1"]);
        assert_eq!(store.load(), ids(&["1"]));

        store.save(&ids(&["1", "2"])).unwrap();
        assert_eq!(store.snapshot(), ids(&["1", "2"]));
        assert_eq!(store.save_count(), 1);
    }
}
