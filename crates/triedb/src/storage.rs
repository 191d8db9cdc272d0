//! Storage trait and implementations

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

/// A single write inside a batch. `None` deletes the key.
pub type BatchOp = (Vec<u8>, Option<Vec<u8>>);

/// Raw key-value store shared by the indexers.
///
/// Implementations synchronize internally: every method takes `&self` so one
/// store can back several backends at once.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Apply a set of writes. The default applies them one by one.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        for (key, value) in ops {
            match value {
                Some(v) => self.put(&key, &v)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for &S {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        (**self).delete(key)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        (**self).write_batch(ops)
    }
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        (**self).delete(key)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        (**self).write_batch(ops)
    }
}

/// In-memory storage (for testing and demos)
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.data.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let data = self.data.read().map_err(poisoned)?;
        let mut keys: Vec<Vec<u8>> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError("lock poisoned".into())
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.remove(key);
        Ok(())
    }

    // Takes the lock once so readers never observe half a batch.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(poisoned)?;
        for (key, value) in ops {
            match value {
                Some(v) => {
                    data.insert(key, v);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Namespaced view of a store: every key is prefixed before it reaches `inner`.
#[derive(Clone)]
pub struct Table<S> {
    inner: S,
    prefix: Vec<u8>,
}

impl<S: Storage> Table<S> {
    pub fn new(inner: S, prefix: impl AsRef<[u8]>) -> Self {
        Self {
            inner,
            prefix: prefix.as_ref().to_vec(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(key);
        out
    }
}

impl<S: Storage> Storage for Table<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(&self.key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(&self.key(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner.delete(&self.key(key))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let ops = ops.into_iter().map(|(k, v)| (self.key(&k), v)).collect();
        self.inner.write_batch(ops)
    }
}
