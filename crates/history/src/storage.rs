//! Storage trait and implementations

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::{HistoryError, Result};

pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&mut self, key: &[u8]) -> Result<()>;
    fn keys(&self) -> Result<Vec<Vec<u8>>>;
}

fn poisoned<T>(_: T) -> HistoryError {
    HistoryError::Storage("storage lock poisoned".into())
}

/// In-memory storage (for testing and one-shot runs)
#[derive(Clone)]
pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let data = self.data.read().map_err(poisoned)?;
        let mut keys: Vec<Vec<u8>> = data.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// A single JSON object on disk, hex key -> hex value. The whole file is
/// rewritten on every mutation.
pub struct FileBackedStorage {
    path: PathBuf,
    data: BTreeMap<String, String>,
}

impl FileBackedStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| HistoryError::Io {
                path: path.clone(),
                source: e,
            })?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).map_err(|e| HistoryError::Serialization(e.to_string()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let io_err = |e| HistoryError::Io {
            path: self.path.clone(),
            source: e,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.data)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl Storage for FileBackedStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.data.get(&hex::encode(key)) {
            Some(v) => hex::decode(v)
                .map(Some)
                .map_err(|e| HistoryError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(hex::encode(key), hex::encode(value));
        self.flush()
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.data.remove(&hex::encode(key)).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.data
            .keys()
            .map(|k| hex::decode(k).map_err(|e| HistoryError::Serialization(e.to_string())))
            .collect()
    }
}
