//! Durable key/value backends for the cart.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::CartError;

/// Browser-style local storage: string values under string keys.
pub trait CartStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CartError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CartError>;
}

impl<T: CartStorage + ?Sized> CartStorage for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> { (**self).load(key) }
    fn save(&self, key: &str, value: &str) -> Result<(), CartError> { (**self).save(key, value) }
}

/// In-memory storage for tests and server-side checkout snapshots.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn with_value(key: &str, value: impl Into<String>) -> Self {
        let storage = Self::new();
        storage.values.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value.into());
        storage
    }
}

impl CartStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> {
        Ok(self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartError> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a directory. Writes go through a temp file and a
/// rename so a crash never leaves a half-written blob.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CartError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| CartError::storage(&dir, e))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf { self.dir.join(key) }
}

impl CartStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartError> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CartError::storage(&path, e)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartError> {
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value).map_err(|e| CartError::storage(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CartError::storage(&path, e))
    }
}
