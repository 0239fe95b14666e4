use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::RwLock;

/// Storage abstraction for session documents
pub trait Storage {
    fn read(&self, key: &str) -> Result<Vec<u8>>;
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;
    fn exists(&self, key: &str) -> bool;
}

/// Read and parse a JSON document.
pub fn read_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Result<T> {
    let bytes = storage
        .read(key)
        .with_context(|| format!("Failed to read {}", key))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", key))
}

/// Write a value as pretty-printed JSON.
pub fn write_json<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    storage.write(key, &json)
}

/// In-memory storage for testing
#[cfg(test)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let data = self.data.read().unwrap();
        data.get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Key not found: {}", key))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut storage = self.data.write().unwrap();
        storage.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        let data = self.data.read().unwrap();
        data.contains_key(key)
    }
}

/// File-based storage rooted at a directory
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let path = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self { base_dir: path })
    }

    /// Storage for the directory holding `file`, plus the key naming it.
    pub fn for_file(file: &Path) -> Result<(Self, String)> {
        let key = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", file.display()))?
            .to_string();
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok((Self::new(dir)?, key))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.base_dir.join(key);
        Ok(std::fs::read(path)?)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.base_dir.join(key);
        Ok(std::fs::write(path, data)?)
    }

    fn exists(&self, key: &str) -> bool {
        self.base_dir.join(key).exists()
    }
}
