//! File-backed JSON key-value store
//!
//! Keys are dotted paths (`server.port`) resolved through nested objects.
//! The file is read lazily on first access; `set` and `unset` only touch
//! the in-memory copy until `save` writes it back.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// A persisted, ordered key-value mapping
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: OnceLock<Map<String, Value>>,
}

impl ConfigStore {
    /// Create a store bound to `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: OnceLock::new(),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file exists on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn read_file(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => {
                debug!("Loaded {} top-level keys from {:?}", map.len(), self.path);
                Ok(map)
            }
            Ok(_) => Err(Error::config(
                self.path.display().to_string(),
                format!("{} does not contain a JSON object", self.path.display()),
            )),
            Err(source) => Err(Error::JsonParse {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    fn values(&self) -> Result<&Map<String, Value>> {
        if let Some(values) = self.values.get() {
            return Ok(values);
        }
        let loaded = self.read_file()?;
        Ok(self.values.get_or_init(|| loaded))
    }

    fn values_mut(&mut self) -> Result<&mut Map<String, Value>> {
        self.values()?;
        self.values
            .get_mut()
            .ok_or_else(|| Error::cli(format!("Config {:?} failed to load", self.path)))
    }

    /// Look up a raw value
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut segments = key.split('.');
        let first = match segments.next() {
            Some(first) if !first.is_empty() => first,
            _ => return Ok(None),
        };

        let mut current = match self.values()?.get(first) {
            Some(value) => value,
            None => return Ok(None),
        };
        for segment in segments {
            current = match current.get(segment) {
                Some(value) => value,
                None => return Ok(None),
            };
        }

        Ok(Some(current.clone()))
    }

    /// Look up a value and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::config(key, format!("Invalid value for '{}': {}", key, e))),
        }
    }

    /// Look up a string value. Numbers and booleans are stringified.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.get(key)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Whether a non-null value exists at `key`
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(!matches!(self.get(key)?, None | Some(Value::Null)))
    }

    /// Set a value in memory, creating intermediate objects as needed
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<&mut Self> {
        let value = serde_json::to_value(value)?;
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::config(key, format!("Invalid config key '{}'", key)));
        }

        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| Error::config(key, "Empty config key"))?;

        let mut current = self.values_mut()?;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry
                .as_object_mut()
                .ok_or_else(|| Error::config(key, format!("Invalid config key '{}'", key)))?;
        }
        current.insert(last.to_string(), value);

        Ok(self)
    }

    /// Set a value only if nothing is stored at `key` yet
    pub fn set_default(&mut self, key: &str, value: impl Serialize) -> Result<&mut Self> {
        if !self.has(key)? {
            self.set(key, value)?;
        }
        Ok(self)
    }

    /// Remove a value in memory. Returns the removed value.
    pub fn unset(&mut self, key: &str) -> Result<Option<Value>> {
        let segments: Vec<&str> = key.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(None);
        };

        let mut current = self.values_mut()?;
        for segment in parents {
            current = match current.get_mut(*segment) {
                Some(Value::Object(map)) => map,
                _ => return Ok(None),
            };
        }
        Ok(current.shift_remove(*last))
    }

    /// Snapshot of the whole mapping
    pub fn to_value(&self) -> Result<Value> {
        Ok(Value::Object(self.values()?.clone()))
    }

    /// Durably write the mapping to disk
    pub fn save(&mut self) -> Result<()> {
        let content = serde_json::to_string_pretty(self.values()?)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(content.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Saved config to {:?}", self.path);
        Ok(())
    }

    /// Drop the in-memory copy so the next read goes back to disk
    pub fn reload(&mut self) {
        self.values = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("config.json"));

        assert!(!store.exists());
        assert_eq!(store.get("url").unwrap(), None);
        assert!(!store.has("url").unwrap());
    }

    #[test]
    fn test_dotted_set_creates_nested_objects() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::new(temp.path().join("config.json"));

        store.set("server.port", 2368).unwrap();
        store.set("server.host", "127.0.0.1").unwrap();

        assert_eq!(store.get("server.port").unwrap(), Some(json!(2368)));
        assert_eq!(
            store.get("server").unwrap(),
            Some(json!({"port": 2368, "host": "127.0.0.1"}))
        );
        assert_eq!(store.get_string("server.port").unwrap().as_deref(), Some("2368"));
    }

    #[test]
    fn test_set_is_memory_only_until_save() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let mut store = ConfigStore::new(&path);

        store.set("url", "http://localhost:2368").unwrap();
        assert!(!path.exists());

        store.save().unwrap();
        let reread = ConfigStore::new(&path);
        assert_eq!(
            reread.get_string("url").unwrap().as_deref(),
            Some("http://localhost:2368")
        );
    }

    #[test]
    fn test_save_preserves_insertion_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let mut store = ConfigStore::new(&path);

        store.set("url", "x").unwrap();
        store.set("database.client", "sqlite3").unwrap();
        store.set("anchor", true).unwrap();
        store.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let url = content.find("\"url\"").unwrap();
        let db = content.find("\"database\"").unwrap();
        let anchor = content.find("\"anchor\"").unwrap();
        assert!(url < db && db < anchor);
    }

    #[test]
    fn test_unset_removes_nested_key() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::new(temp.path().join("config.json"));

        store.set("running", "production").unwrap();
        store.set("paths.contentPath", "/var/www/ghost/content").unwrap();

        assert_eq!(store.unset("running").unwrap(), Some(json!("production")));
        assert!(store.unset("paths.missing").unwrap().is_none());
        assert!(!store.has("running").unwrap());
        assert!(store.has("paths.contentPath").unwrap());
    }

    #[test]
    fn test_set_default_keeps_existing() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::new(temp.path().join("config.json"));

        store.set("process", "systemd").unwrap();
        store.set_default("process", "local").unwrap();
        store.set_default("server.port", 2368).unwrap();

        assert_eq!(store.get_string("process").unwrap().as_deref(), Some("systemd"));
        assert_eq!(store.get_as::<u16>("server.port").unwrap(), Some(2368));
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::new(&path);
        assert!(matches!(store.get("url"), Err(Error::JsonParse { .. })));
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::new(temp.path().join("config.json"));

        store.set("url", "http://a.example").unwrap();
        store.save().unwrap();
        store.set("url", "http://b.example").unwrap();
        store.reload();

        assert_eq!(
            store.get_string("url").unwrap().as_deref(),
            Some("http://a.example")
        );
    }

    #[test]
    fn test_rejects_empty_key_segments() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::new(temp.path().join("config.json"));
        assert!(store.set("server..port", 1).is_err());
    }
}
