//! JSON file store
//!
//! The whole store is one JSON object on disk. Every write rewrites the file,
//! through a sibling temp file so a crash never leaves it half written.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use bm_core::{Error, KeyValueStore, Result};

pub struct FileStore {
    path: PathBuf,
    entries: RefCell<HashMap<String, Value>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => HashMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::storage(format!("Failed to read '{}': {}", path.display(), e))),
        };

        log::debug!("Opened store '{}' ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn flush(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&*self.entries.borrow())?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("Failed to create '{}': {}", parent.display(), e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| Error::storage(format!("Failed to write '{}': {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::storage(format!("Failed to replace '{}': {}", self.path.display(), e)))
    }
}

#[async_trait(?Send)]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        self.entries.borrow_mut().extend(items);
        self.flush()
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.entries.borrow_mut().remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        self.flush()
    }
}
