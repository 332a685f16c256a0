//! This module provides a local, single-device cache for records
//!
//! The cache is a key-value store. Every collection is an entry whose value is the JSON-encoded, ordered
//! array of its records. One reserved entry ([`MIGRATION_SENTINEL_KEY`]) records whether the migration sweep already ran.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MIGRATION_SENTINEL_KEY;
use crate::error::StoreError;
use crate::record::{id_of, Fields, Record, RecordId, ID_FIELD};

const ENTRY_FILE_EXTENSION: &str = "json";


/// A key-value store, written through to a folder (one file per entry), or kept in memory only
#[derive(Debug, PartialEq)]
pub struct Cache {
    backing_folder: Option<PathBuf>,
    data: CachedData,
}

#[derive(Default, Debug, PartialEq)]
struct CachedData {
    entries: BTreeMap<String, String>,
}

/// The content of an entry file. The key is stored inside, since file names are sanitized
#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    key: String,
    value: String,
}

impl Cache {
    /// Initialize an empty cache, that will be written to `folder`
    pub fn new(folder: &Path) -> Self {
        Self {
            backing_folder: Some(PathBuf::from(folder)),
            data: CachedData::default(),
        }
    }

    /// Initialize a cache that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            backing_folder: None,
            data: CachedData::default(),
        }
    }

    /// Initialize a cache from the content of a valid backing folder if it exists.
    /// Returns an error otherwise
    pub fn from_folder(folder: &Path) -> Result<Self, StoreError> {
        let mut data = CachedData::default();

        let dir = std::fs::read_dir(folder)
            .map_err(|err| StoreError::LocalCache(format!("Unable to open folder {:?}: {}", folder, err)))?;
        for dir_entry in dir {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_FILE_EXTENSION) {
                continue;
            }
            let file = match std::fs::File::open(&path) {
                Err(err) => {
                    log::warn!("Unable to open cache entry {:?}: {}. Skipping it", path, err);
                    continue;
                },
                Ok(file) => file,
            };
            match serde_json::from_reader::<_, EntryFile>(file) {
                Err(err) => log::warn!("Invalid cache entry {:?}: {}. Skipping it", path, err),
                Ok(entry) => { data.entries.insert(entry.key, entry.value); },
            }
        }

        Ok(Self {
            backing_folder: Some(PathBuf::from(folder)),
            data,
        })
    }

    /// Open the cache stored in `folder`, or start an empty one there if it cannot be read
    pub fn open_or_new(folder: &Path) -> Self {
        match Self::from_folder(folder) {
            Ok(cache) => cache,
            Err(err) => {
                log::warn!("Invalid cache folder: {}. Using an empty cache", err);
                Self::new(folder)
            },
        }
    }

    pub fn backing_folder(&self) -> Option<&Path> {
        self.backing_folder.as_deref()
    }

    /// Store every entry of this cache to its backing folder
    pub fn save_to_folder(&self) -> Result<(), StoreError> {
        for (key, value) in &self.data.entries {
            self.write_entry_file(key, value)?;
        }
        Ok(())
    }

    fn entry_path(folder: &Path, key: &str) -> PathBuf {
        let file_name = sanitize_filename::sanitize(key);
        folder.join(format!("{}.{}", file_name, ENTRY_FILE_EXTENSION))
    }

    fn write_entry_file(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let folder = match &self.backing_folder {
            None => return Ok(()),
            Some(folder) => folder,
        };
        std::fs::create_dir_all(folder)?;
        let entry = EntryFile { key: key.to_string(), value: value.to_string() };
        let file = std::fs::File::create(Self::entry_path(folder, key))?;
        serde_json::to_writer(file, &entry)?;
        Ok(())
    }


    // ===== Raw entries =====

    pub fn get_entry(&self, key: &str) -> Option<&str> {
        self.data.entries.get(key).map(|v| v.as_str())
    }

    pub fn set_entry(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.write_entry_file(key, &value)?;
        self.data.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove_entry(&mut self, key: &str) -> Result<bool, StoreError> {
        if let Some(folder) = &self.backing_folder {
            let path = Self::entry_path(folder, key);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(self.data.entries.remove(key).is_some())
    }

    pub fn entry_keys(&self) -> Vec<String> {
        self.data.entries.keys().cloned().collect()
    }


    // ===== Collections =====

    /// The stored sequence of a collection, invalid records included
    pub fn raw_records(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        match self.get_entry(collection) {
            None => Ok(Vec::new()),
            Some(raw) => match serde_json::from_str::<Value>(raw)? {
                Value::Array(items) => Ok(items),
                Value::Null => Ok(Vec::new()),
                _ => Err(StoreError::LocalCache(format!("Entry {} is not an array of records", collection))),
            },
        }
    }

    fn write_raw_records(&mut self, collection: &str, items: &[Value]) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(items)?;
        self.set_entry(collection, encoded)
    }

    /// The valid records of a collection, in their stored order
    pub fn records(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        Ok(valid_records(self.raw_records(collection)?))
    }

    /// Drop the records that have no valid identifier, and the later copies of an identifier seen before.
    ///
    /// Returns the remaining records and how many were dropped. The entry is only rewritten when something was dropped
    pub fn purge_invalid(&mut self, collection: &str) -> Result<(Vec<Record>, usize), StoreError> {
        let raw = self.raw_records(collection)?;
        let n_raw = raw.len();
        let valid = valid_records(raw);
        let n_dropped = n_raw - valid.len();
        if n_dropped > 0 {
            log::info!("Dropping {} invalid or duplicate record(s) from the cached {}", n_dropped, collection);
            self.replace_records(collection, &valid)?;
        }
        Ok((valid, n_dropped))
    }

    /// Overwrite a whole collection
    pub fn replace_records(&mut self, collection: &str, records: &[Record]) -> Result<(), StoreError> {
        let items: Vec<Value> = records.iter().map(|r| r.to_value()).collect();
        self.write_raw_records(collection, &items)
    }

    pub fn find_record(&self, collection: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.raw_records(collection)?
            .into_iter()
            .find(|item| id_of(item).as_ref() == Some(id))
            .and_then(Record::from_value))
    }

    /// Append a record to a collection
    pub fn insert_record(&mut self, collection: &str, record: Record) -> Result<(), StoreError> {
        let mut items = self.raw_records(collection)?;
        items.push(record.to_value());
        self.write_raw_records(collection, &items)
    }

    /// Merge `patch` into the record `id`, keeping the fields `patch` does not mention.
    /// A record that does not exist yet is appended.
    pub fn merge_record(&mut self, collection: &str, id: &RecordId, patch: &Fields) -> Result<Record, StoreError> {
        let mut items = self.raw_records(collection)?;

        let merged = match items.iter_mut().find(|item| id_of(item).as_ref() == Some(id)) {
            Some(Value::Object(existing)) => {
                for (key, value) in patch {
                    if key == ID_FIELD {
                        continue;
                    }
                    existing.insert(key.clone(), value.clone());
                }
                // The stored identifier may have been untrimmed, or a number
                existing.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                Record::new(id.clone(), existing.clone())
            },
            _ => {
                let record = Record::new(id.clone(), patch.clone());
                items.push(record.to_value());
                record
            },
        };

        self.write_raw_records(collection, &items)?;
        Ok(merged)
    }

    /// Remove every copy of the record `id`. Returns whether something was removed
    pub fn remove_record(&mut self, collection: &str, id: &RecordId) -> Result<bool, StoreError> {
        let mut items = self.raw_records(collection)?;
        let n_before = items.len();
        items.retain(|item| id_of(item).as_ref() != Some(id));
        if items.len() == n_before {
            return Ok(false);
        }
        self.write_raw_records(collection, &items)?;
        Ok(true)
    }


    // ===== Migration sentinel =====

    /// Whether the migration sweep has already run on this device
    pub fn migration_done(&self) -> bool {
        self.get_entry(MIGRATION_SENTINEL_KEY).is_some()
    }

    pub fn mark_migration_done(&mut self, details: &Value) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(details)?;
        self.set_entry(MIGRATION_SENTINEL_KEY, encoded)
    }
}

/// Parse raw records, skipping invalid ones. Only the first record of an identifier is kept,
/// since it is the one [`Cache::find_record`] returns
fn valid_records(raw: Vec<Value>) -> Vec<Record> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(Record::from_value)
        .filter(|record| seen.insert(record.id().clone()))
        .collect()
}
