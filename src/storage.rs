use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    Io { path: PathBuf, message: String },
    Serialize(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, message } => {
                write!(f, "failed to write {}: {message}", path.display())
            }
            StoreError::Serialize(message) => write!(f, "failed to serialize store: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// String key-value persistence, shaped like browser local storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    values: HashMap<String, String>,
}

/// Whole-file JSON store. Every `set` rewrites the file.
pub struct JsonFileStore {
    file_path: PathBuf,
    values: HashMap<String, String>,
}

impl JsonFileStore {
    pub fn new(file_path: PathBuf) -> Self {
        let values = load_values(&file_path);
        Self { file_path, values }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|error| StoreError::Io {
                path: parent.to_path_buf(),
                message: error.to_string(),
            })?;
        }
        let payload = StoreFile {
            version: 1,
            values: self.values.clone(),
        };
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|error| StoreError::Serialize(error.to_string()))?;
        fs::write(&self.file_path, text).map_err(|error| StoreError::Io {
            path: self.file_path.clone(),
            message: error.to_string(),
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let previous = self.values.insert(key.to_string(), value);
        if let Err(error) = self.save() {
            // Keep memory and disk in step so a retry writes the same thing.
            match previous {
                Some(old) => self.values.insert(key.to_string(), old),
                None => self.values.remove(key),
            };
            return Err(error);
        }
        Ok(())
    }
}

fn load_values(path: &Path) -> HashMap<String, String> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read store file");
            }
            return HashMap::new();
        }
    };
    match serde_json::from_str::<StoreFile>(&text) {
        Ok(file) if file.version == 1 => file.values,
        Ok(file) => {
            warn!(
                path = %path.display(),
                version = file.version,
                "unsupported store file version"
            );
            HashMap::new()
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse store file");
            HashMap::new()
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_file(name: &str) -> PathBuf {
    let unique = format!(
        "{}-{}-{}",
        name,
        std::process::id(),
        rand::random::<u32>()
    );
    std::env::temp_dir().join(unique).join("store.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "1".to_string()).expect("set");
        store.set("k", "2".to_string()).expect("set");
        assert_eq!(store.get("k").as_deref(), Some("2"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = temp_file("kv-reopen");
        let mut store = JsonFileStore::new(path.clone());
        store
            .set("pacman_high_scores", "[1,2,3]".to_string())
            .expect("write succeeds");

        let reopened = JsonFileStore::new(path.clone());
        assert_eq!(
            reopened.get("pacman_high_scores").as_deref(),
            Some("[1,2,3]")
        );

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn unreadable_or_foreign_files_start_empty() {
        let path = temp_file("kv-foreign");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");

        fs::write(&path, "not json").expect("write file");
        assert_eq!(JsonFileStore::new(path.clone()).get("a"), None);

        fs::write(&path, r#"{"version": 7, "values": {"a": "b"}}"#).expect("write file");
        assert_eq!(JsonFileStore::new(path.clone()).get("a"), None);

        fs::write(&path, r#"{"version": 1, "values": {"a": "b"}}"#).expect("write file");
        assert_eq!(JsonFileStore::new(path.clone()).get("a").as_deref(), Some("b"));

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn failed_write_rolls_back_value() {
        let path = temp_file("kv-blocked");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        // A directory where the file should be makes every write fail.
        fs::create_dir_all(&path).expect("create blocking dir");

        let mut store = JsonFileStore::new(path.clone());
        let error = store.set("a", "b".to_string()).expect_err("write fails");
        assert!(matches!(error, StoreError::Io { .. }));
        assert_eq!(store.get("a"), None);

        let _ = fs::remove_dir_all(&parent);
    }
}
