//! Storage backends for the message cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Cache layer errors. Never surfaced to callers of the session.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend failed.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded.
    #[error("Cache record error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key/value storage behind the cache.
///
/// Implementations must be safe to share between sessions. Concurrent
/// writers to the same key resolve as last-write-wins.
pub trait CacheBackend: Send + Sync {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    /// Removes a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-memory backend. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |map| map.len())
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Backend("memory cache lock poisoned".to_string())
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert!(backend.get("k").unwrap().is_none());
        backend.set("k", b"v1".to_vec()).unwrap();
        backend.set("k", b"v2".to_vec()).unwrap();
        assert_eq!(backend.get("k").unwrap().unwrap(), b"v2");
        backend.delete("k").unwrap();
        backend.delete("k").unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn test_memory_backend_shared_between_clones() {
        let a = MemoryBackend::new();
        let b = a.clone();
        a.set("x", vec![1]).unwrap();
        assert_eq!(b.get("x").unwrap(), Some(vec![1]));
        assert_eq!(b.len(), 1);
    }
}
