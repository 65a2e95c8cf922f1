use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// String key-value storage, the shape of a browser's session or local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// Lives as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Keeps every key in a single JSON object on disk.
///
/// Each write reads the whole file, changes one key and writes it back,
/// so values survive restarts of the bot.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring unreadable store file {}: {}",
                    self.path.display(),
                    err
                );
                HashMap::new()
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(entries)?;
        // A crash mid-write must not leave half a file behind
        let staged = self.path.with_extension("tmp");
        fs::write(&staged, contents)?;
        fs::rename(&staged, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// A view of another store where every key gets a fixed prefix.
/// One chat sees only its own keys.
pub struct Scoped<'a> {
    inner: &'a dyn KeyValueStore,
    prefix: String,
}

impl<'a> Scoped<'a> {
    pub fn new(inner: &'a dyn KeyValueStore, scope: impl std::fmt::Display) -> Self {
        Self {
            inner,
            prefix: format!("{}:", scope),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl KeyValueStore for Scoped<'_> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(&self.key(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(&self.key(key), value)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.inner.clear(&self.key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn temp_path() -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("trivia-store-{suffix}.json"))
    }

    #[test]
    fn memory_store_sets_reads_and_clears() {
        let store = MemoryStore::new();
        assert_eq!(store.get("username").unwrap(), None);

        store.set("username", "Ada").unwrap();
        assert_eq!(store.get("username").unwrap().as_deref(), Some("Ada"));

        store.clear("username").unwrap();
        assert_eq!(store.get("username").unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopening() {
        let path = temp_path();
        {
            let store = FileStore::new(&path);
            assert_eq!(store.get("scores").unwrap(), None);
            store.set("scores", "[]").unwrap();
            store.set("other", "x").unwrap();
            store.clear("other").unwrap();
        }

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("scores").unwrap().as_deref(), Some("[]"));
        assert_eq!(reopened.get("other").unwrap(), None);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn corrupted_file_reads_as_empty_and_gets_replaced() {
        let path = temp_path();
        fs::write(&path, r#"{"scores": "[{\"player\":"#).unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get("scores").unwrap(), None);

        store.set("scores", "[]").unwrap();
        assert_eq!(store.get("scores").unwrap().as_deref(), Some("[]"));
        assert!(!path.with_extension("tmp").exists());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn scoped_stores_do_not_see_each_other() {
        let backing = MemoryStore::new();
        let first = Scoped::new(&backing, 1);
        let second = Scoped::new(&backing, 2);

        first.set("username", "Ada").unwrap();
        assert_eq!(first.get("username").unwrap().as_deref(), Some("Ada"));
        assert_eq!(second.get("username").unwrap(), None);
        assert_eq!(backing.get("1:username").unwrap().as_deref(), Some("Ada"));

        second.clear("username").unwrap();
        assert_eq!(first.get("username").unwrap().as_deref(), Some("Ada"));
    }
}
