//! Persisted key-value storage for the Pulse client
//!
//! String keys map to string values, the same shape as browser local
//! storage. Callers that treat persistence as best-effort (the result cache,
//! active-job markers) swallow the errors returned here.

use std::sync::Arc;
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Storage not available: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// String key-value store
pub trait KeyValueStore: Send + Sync {
    /// Get a string value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a string value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value
    fn remove(&self, key: &str) -> Result<()>;

    /// Get all keys
    fn keys(&self) -> Result<Vec<String>>;

    /// Clear all storage
    fn clear(&self) -> Result<()>;

    /// Check if a key exists
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Typed JSON helpers over any store
pub trait JsonStoreExt: KeyValueStore {
    /// Store JSON data
    fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.set(key, &json)
    }

    /// Get JSON data
    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl<S: KeyValueStore + ?Sized> JsonStoreExt for S {}

/// Store that refuses every operation, as browsers do in some privacy modes
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

impl KeyValueStore for DisabledStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn clear(&self) -> Result<()> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker {
        job: String,
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        store
            .set_json("active:u:k:{}", &Marker { job: "7".into() })
            .unwrap();

        let marker: Option<Marker> = store.get_json("active:u:k:{}").unwrap();
        assert_eq!(marker, Some(Marker { job: "7".into() }));
        assert!(store.has("active:u:k:{}").unwrap());

        let missing: Option<Marker> = store.get_json("nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_disabled_store_fails() {
        let store = DisabledStore;
        assert!(matches!(
            store.set("a", "b"),
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.get("a").is_err());
    }

    #[test]
    fn test_shared_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.set_json("n", &3).unwrap();
        assert_eq!(store.get_json::<i32>("n").unwrap(), Some(3));
    }
}
