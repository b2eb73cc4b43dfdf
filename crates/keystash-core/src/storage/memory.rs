use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::secret_store::{SecretStore, SecretStoreError};

/// In-memory secret store for tests and smoke runs. Nothing is persisted.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for InMemorySecretStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        let mut map = self.inner.lock().map_err(poisoned)?;
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, SecretStoreError> {
        let map = self.inner.lock().map_err(poisoned)?;
        map.get(key)
            .cloned()
            .ok_or_else(|| SecretStoreError::not_found(key))
    }

    fn exists(&self, key: &str) -> Result<bool, SecretStoreError> {
        let map = self.inner.lock().map_err(poisoned)?;
        Ok(map.contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        let mut map = self.inner.lock().map_err(poisoned)?;
        map.remove(key);
        Ok(())
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> SecretStoreError {
    SecretStoreError::io("memory store", format!("lock poisoned: {err}"))
}
