//! Persisted key/value storage for settings and the notification ledger
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Logical keys persisted by the service
pub mod keys {
    pub const SCHEDULED_NOTIFICATIONS: &str = "scheduled_notifications";
    pub const SNOOZE_STATES: &str = "snooze_states";
    pub const LAST_NOTIFICATION_DATE: &str = "last_notification_date";
    pub const SETTINGS: &str = "settings";
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;
    async fn set_raw(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a key; `None` when the key was never written
pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get_raw(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse stored value for '{}'", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize value for '{}'", key))?;
    store.set_raw(key, raw).await
}

/// One JSON file per key under a data directory
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    async fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir)
                .await
                .context("Failed to create data directory")?;
            info!("Created data directory: {:?}", self.data_dir);
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!("Store file does not exist: {:?}", path);
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read store file {:?}", path))?;
        Ok(Some(content))
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.ensure_data_dir().await?;

        // Write-then-rename so a crash never leaves a truncated file behind
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value)
            .await
            .with_context(|| format!("Failed to write store file {:?}", tmp_path))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move {:?} into place", tmp_path))?;

        debug!("Saved '{}' to {:?}", key, path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove store file {:?}: {}", path, e);
                Err(e).with_context(|| format!("Failed to remove {:?}", path))
            }
        }
    }
}

/// Volatile store, for embedding without a filesystem
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("data"));

        assert!(store.get_raw(keys::SETTINGS).await.unwrap().is_none());

        let mut values = HashMap::new();
        values.insert("fajr".to_string(), 5);
        save_json(&store, keys::SETTINGS, &values).await.unwrap();

        let loaded: HashMap<String, i32> = load_json(&store, keys::SETTINGS).await.unwrap().unwrap();
        assert_eq!(loaded.get("fajr"), Some(&5));
        assert!(!temp_dir.path().join("data/settings.json.tmp").exists());

        store.remove(keys::SETTINGS).await.unwrap();
        store.remove(keys::SETTINGS).await.unwrap();
        assert!(store.get_raw(keys::SETTINGS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let store = MemoryStore::new();
        store
            .set_raw(keys::LAST_NOTIFICATION_DATE, "{not json".to_string())
            .await
            .unwrap();
        let result: Result<Option<String>> = load_json(&store, keys::LAST_NOTIFICATION_DATE).await;
        assert!(result.is_err());
    }
}
