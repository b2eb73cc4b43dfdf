//! Native platform keychain backend.

use std::sync::Arc;

use keystash_core::storage::{FnSecretStore, SecretStoreError};
use tracing::debug;

/// Minimal keychain wrapper: secrets addressed by (service, account).
/// A missing entry is reported as [`SecretStoreError::NotFound`].
pub trait Keychain: Send + Sync {
    fn get(&self, service: &str, account: &str) -> Result<Vec<u8>, SecretStoreError>;
    fn set(&self, service: &str, account: &str, secret: &[u8]) -> Result<(), SecretStoreError>;
    fn delete(&self, service: &str, account: &str) -> Result<(), SecretStoreError>;
}

/// OS keychain via the `keyring` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKeychain;

impl SystemKeychain {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(service, account)
            .map_err(|e| keyring_err("keyring entry", account, e))
    }
}

impl Keychain for SystemKeychain {
    fn get(&self, service: &str, account: &str) -> Result<Vec<u8>, SecretStoreError> {
        Self::entry(service, account)?
            .get_secret()
            .map_err(|e| keyring_err("keyring get", account, e))
    }

    fn set(&self, service: &str, account: &str, secret: &[u8]) -> Result<(), SecretStoreError> {
        Self::entry(service, account)?
            .set_secret(secret)
            .map_err(|e| keyring_err("keyring set", account, e))
    }

    fn delete(&self, service: &str, account: &str) -> Result<(), SecretStoreError> {
        Self::entry(service, account)?
            .delete_credential()
            .map_err(|e| keyring_err("keyring delete", account, e))
    }
}

fn keyring_err(context: &str, account: &str, err: keyring::Error) -> SecretStoreError {
    match err {
        keyring::Error::NoEntry => SecretStoreError::not_found(account),
        other => SecretStoreError::io(context, other),
    }
}

/// Contract backend over `keychain`, scoped to `app_id` as the service name.
pub fn keychain_store(keychain: Arc<dyn Keychain>, app_id: &str) -> FnSecretStore {
    debug!(app_id, "using native keychain");
    let (set, get, probe, del) = (
        keychain.clone(),
        keychain.clone(),
        keychain.clone(),
        keychain,
    );
    let (s1, s2, s3, s4) = (
        app_id.to_string(),
        app_id.to_string(),
        app_id.to_string(),
        app_id.to_string(),
    );
    FnSecretStore::new(
        move |key, value| set.set(&s1, key, value),
        move |key| get.get(&s2, key),
        move |key| match probe.get(&s3, key) {
            Ok(value) => Ok(!value.is_empty()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        },
        move |key| del.delete(&s4, key),
    )
}
