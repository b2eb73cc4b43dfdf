//! Kernel persistent keyring driven through the `keyctl` command.
//!
//! Secrets are `user` keys linked into the caller's persistent keyring, which
//! outlives login sessions. The keyring id is fetched once at construction.

use std::{path::PathBuf, sync::Arc};

use keystash_core::storage::{Prerequisite, SecretStore, SecretStoreError};
use tracing::{debug, instrument};

use crate::process::{tool_failure, CommandRunner};

pub const KEYCTL: &str = "keyctl";
const KEY_TYPE: &str = "user";

/// Check that `keyctl` is installed. Returns its resolved path.
pub fn probe_keyctl(runner: &dyn CommandRunner) -> Result<PathBuf, SecretStoreError> {
    match runner.locate(KEYCTL) {
        Ok(Some(path)) => Ok(path),
        _ => Err(SecretStoreError::PrerequisiteMissing(
            Prerequisite::SecretManager,
        )),
    }
}

pub struct KeyctlStore {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    persistent_keyring: String,
}

impl KeyctlStore {
    /// Resolve the current user's persistent keyring. Fails when `keyctl`
    /// cannot report it (e.g. the kernel lacks persistent keyring support).
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: PathBuf,
    ) -> Result<Self, SecretStoreError> {
        let args = ["get_persistent", "@u"];
        let out = runner.run(&program, &args, None)?;
        if !out.success() {
            return Err(tool_failure(&program, &args, &out));
        }
        let persistent_keyring = String::from_utf8_lossy(&out.stdout).trim_end().to_string();
        debug!(%persistent_keyring, "resolved persistent keyring");
        Ok(Self {
            runner,
            program,
            persistent_keyring,
        })
    }

    pub fn persistent_keyring(&self) -> &str {
        &self.persistent_keyring
    }

    /// Internal key id for `key`, or `None` when the search fails.
    fn search(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        let args = ["search", self.persistent_keyring.as_str(), KEY_TYPE, key];
        let out = self.runner.run(&self.program, &args, None)?;
        if !out.success() {
            debug!(%out, "key search failed");
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&out.stdout).trim_end().to_string(),
        ))
    }
}

impl SecretStore for KeyctlStore {
    #[instrument(skip_all, fields(key))]
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        // keyctl takes the payload as an argument, so it must be valid text
        let value = std::str::from_utf8(value).map_err(|e| SecretStoreError::io("keyctl add", e))?;
        let args = ["add", KEY_TYPE, key, value, self.persistent_keyring.as_str()];
        let out = self.runner.run(&self.program, &args, None)?;
        if !out.success() {
            return Err(tool_failure(&self.program, &args, &out));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(key))]
    fn load(&self, key: &str) -> Result<Vec<u8>, SecretStoreError> {
        let key_id = self
            .search(key)?
            .ok_or_else(|| SecretStoreError::not_found(key))?;

        let args = ["print", key_id.as_str()];
        let mut out = self.runner.run(&self.program, &args, None)?;
        if !out.success() {
            return Err(tool_failure(&self.program, &args, &out));
        }
        if out.stdout.last() == Some(&b'\n') {
            out.stdout.pop();
        }
        Ok(out.stdout)
    }

    fn exists(&self, key: &str) -> Result<bool, SecretStoreError> {
        Ok(self.search(key)?.is_some())
    }

    #[instrument(skip_all, fields(key))]
    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        let args = ["purge", KEY_TYPE, key];
        let out = self.runner.run(&self.program, &args, None)?;
        if !out.success() {
            return Err(tool_failure(&self.program, &args, &out));
        }
        Ok(())
    }
}
