//! Per-plugin key/value storage.

use crate::config::save_json_config;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// `None` when the key has never been set.
    async fn get(&self, plugin_id: &str, key: &str) -> Result<Option<Value>, String>;
    async fn set(&self, plugin_id: &str, key: &str, value: Value) -> Result<(), String>;
    async fn remove(&self, plugin_id: &str, key: &str) -> Result<(), String>;
    async fn get_all(&self, plugin_id: &str) -> Result<Map<String, Value>, String>;
    /// Merge `entries` into the plugin's map.
    async fn set_all(&self, plugin_id: &str, entries: Map<String, Value>) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// JSON file storage
// ---------------------------------------------------------------------------

/// One pretty-printed `{data_dir}/{plugin_id}.json` per plugin.
pub struct JsonFileStorage {
    data_dir: PathBuf,
    // Serializes read-modify-write cycles across plugins.
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn file_for(&self, plugin_id: &str) -> PathBuf {
        self.data_dir.join(format!("{plugin_id}.json"))
    }

    fn read_map(path: &Path) -> Result<Map<String, Value>, String> {
        if !path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read plugin data: {e}"))?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(format!("Plugin data {} is not a JSON object", path.display())),
            Err(e) => Err(format!("Corrupt plugin data {}: {e}", path.display())),
        }
    }

    /// Reads tolerate corruption: log it and behave as if nothing is stored.
    fn read_lenient(&self, plugin_id: &str) -> Map<String, Value> {
        let path = self.file_for(plugin_id);
        Self::read_map(&path).unwrap_or_else(|e| {
            tracing::error!(plugin_id, "{e}");
            Map::new()
        })
    }

    fn update(
        &self,
        plugin_id: &str,
        apply: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<(), String> {
        let _guard = self.write_lock.lock();
        let path = self.file_for(plugin_id);
        let mut map = Self::read_map(&path)?;
        apply(&mut map);
        save_json_config(&path, &map)
    }
}

#[async_trait]
impl StorageBackend for JsonFileStorage {
    async fn get(&self, plugin_id: &str, key: &str) -> Result<Option<Value>, String> {
        Ok(self.read_lenient(plugin_id).remove(key))
    }

    async fn set(&self, plugin_id: &str, key: &str, value: Value) -> Result<(), String> {
        self.update(plugin_id, |map| {
            map.insert(key.to_string(), value);
        })
    }

    async fn remove(&self, plugin_id: &str, key: &str) -> Result<(), String> {
        self.update(plugin_id, |map| {
            map.remove(key);
        })
    }

    async fn get_all(&self, plugin_id: &str) -> Result<Map<String, Value>, String> {
        Ok(self.read_lenient(plugin_id))
    }

    async fn set_all(&self, plugin_id: &str, entries: Map<String, Value>) -> Result<(), String> {
        self.update(plugin_id, |map| map.extend(entries))
    }
}

// ---------------------------------------------------------------------------
// In-memory storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStorage {
    plugins: DashMap<String, Map<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, plugin_id: &str, key: &str) -> Result<Option<Value>, String> {
        Ok(self
            .plugins
            .get(plugin_id)
            .and_then(|map| map.get(key).cloned()))
    }

    async fn set(&self, plugin_id: &str, key: &str, value: Value) -> Result<(), String> {
        self.plugins
            .entry(plugin_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, plugin_id: &str, key: &str) -> Result<(), String> {
        if let Some(mut map) = self.plugins.get_mut(plugin_id) {
            map.remove(key);
        }
        Ok(())
    }

    async fn get_all(&self, plugin_id: &str) -> Result<Map<String, Value>, String> {
        Ok(self
            .plugins
            .get(plugin_id)
            .map(|map| map.clone())
            .unwrap_or_default())
    }

    async fn set_all(&self, plugin_id: &str, entries: Map<String, Value>) -> Result<(), String> {
        self.plugins
            .entry(plugin_id.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }
}
