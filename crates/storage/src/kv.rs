use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use shared::error::PersistenceError;
use tokio::{fs, sync::Mutex};

/// A string-valued key-value slot store, the local persistent storage the
/// client keeps its session in.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    async fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        validate_key(key)?;
        Ok(self.slots.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        validate_key(key)?;
        self.slots
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        validate_key(key)?;
        self.slots.lock().await.remove(key);
        Ok(())
    }
}

/// Stores each slot as `<root>/<key>.json`.
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io { path, source }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.slot_path(key)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.root.clone(),
                source,
            })?;
        fs::write(&path, value)
            .await
            .map_err(|source| PersistenceError::Io { path, source })
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.slot_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io { path, source }),
        }
    }
}

fn validate_key(key: &str) -> Result<(), PersistenceError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidKey(key.to_string()))
    }
}
