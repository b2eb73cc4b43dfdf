use std::fmt;

use super::secret_store::{SecretStore, SecretStoreError};

pub type StoreFn = Box<dyn Fn(&str, &[u8]) -> Result<(), SecretStoreError> + Send + Sync>;
pub type LoadFn = Box<dyn Fn(&str) -> Result<Vec<u8>, SecretStoreError> + Send + Sync>;
pub type ExistsFn = Box<dyn Fn(&str) -> Result<bool, SecretStoreError> + Send + Sync>;
pub type DeleteFn = Box<dyn Fn(&str) -> Result<(), SecretStoreError> + Send + Sync>;

/// Secret store assembled from four independent operations.
///
/// Lets a backend be built from closures capturing its configuration, and lets
/// tests substitute arbitrary behaviour per operation.
pub struct FnSecretStore {
    store: StoreFn,
    load: LoadFn,
    exists: ExistsFn,
    delete: DeleteFn,
}

impl FnSecretStore {
    pub fn new<S, L, E, D>(store: S, load: L, exists: E, delete: D) -> Self
    where
        S: Fn(&str, &[u8]) -> Result<(), SecretStoreError> + Send + Sync + 'static,
        L: Fn(&str) -> Result<Vec<u8>, SecretStoreError> + Send + Sync + 'static,
        E: Fn(&str) -> Result<bool, SecretStoreError> + Send + Sync + 'static,
        D: Fn(&str) -> Result<(), SecretStoreError> + Send + Sync + 'static,
    {
        Self {
            store: Box::new(store),
            load: Box::new(load),
            exists: Box::new(exists),
            delete: Box::new(delete),
        }
    }
}

impl fmt::Debug for FnSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSecretStore").finish_non_exhaustive()
    }
}

impl SecretStore for FnSecretStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        (self.store)(key, value)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, SecretStoreError> {
        (self.load)(key)
    }

    fn exists(&self, key: &str) -> Result<bool, SecretStoreError> {
        (self.exists)(key)
    }

    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        (self.delete)(key)
    }
}
