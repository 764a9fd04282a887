//! Key/value storage capability
//!
//! Mirrors the shape of the browser's extension storage area: values are JSON,
//! reads take a list of keys and return only those present.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Persistent key/value store.
#[async_trait(?Send)]
pub trait KeyValueStore {
    /// Read the given keys. Missing keys are absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Write every entry in one operation.
    async fn set(&self, items: HashMap<String, Value>) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[async_trait(?Send)]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        (**self).get(keys).await
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        (**self).set(items).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}

/// In-process store, used by tests and by hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Copy of a single value, for inspection.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        self.entries.borrow_mut().extend(items);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}
