//! Session-bus secret service driven through the `secret-tool` command.

use std::{path::PathBuf, sync::Arc};

use keystash_core::storage::{AppIdentity, Prerequisite, SecretStore, SecretStoreError};
use tracing::{debug, instrument};

use crate::process::{package_installed, tool_failure, CommandRunner};

/// Keyring daemon that must be present for `secret-tool` to reach a collection.
pub const KEYRING_DAEMON: &str = "gnome-keyring";
pub const SECRET_TOOL: &str = "secret-tool";

/// Check that both the keyring daemon and `secret-tool` are installed.
/// Returns the resolved `secret-tool` path.
pub fn probe_secret_service(runner: &dyn CommandRunner) -> Result<PathBuf, SecretStoreError> {
    if !package_installed(runner, KEYRING_DAEMON).unwrap_or(false) {
        return Err(SecretStoreError::PrerequisiteMissing(Prerequisite::Keyring));
    }
    match runner.locate(SECRET_TOOL) {
        Ok(Some(path)) => Ok(path),
        _ => Err(SecretStoreError::PrerequisiteMissing(
            Prerequisite::SecretManager,
        )),
    }
}

/// Secrets are stored with the attributes `<appId> <key>` and labelled with the
/// application description.
pub struct SecretToolStore {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    app: AppIdentity,
}

impl SecretToolStore {
    /// `program` is expected to come from [`probe_secret_service`].
    pub fn new(runner: Arc<dyn CommandRunner>, program: PathBuf, app: AppIdentity) -> Self {
        Self {
            runner,
            program,
            app,
        }
    }
}

impl SecretStore for SecretToolStore {
    #[instrument(skip_all, fields(key))]
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        let label = format!("--label={}", self.app.description);
        let args = ["store", label.as_str(), self.app.id.as_str(), key];
        let out = self.runner.run(&self.program, &args, Some(value))?;
        if !out.success() {
            return Err(tool_failure(&self.program, &args, &out));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(key))]
    fn load(&self, key: &str) -> Result<Vec<u8>, SecretStoreError> {
        let args = ["lookup", self.app.id.as_str(), key];
        let out = self.runner.run(&self.program, &args, None)?;
        // secret-tool exits 1 both for a missing item and for lookup errors
        if !out.success() {
            debug!(%out, "lookup failed, treating as not found");
            return Err(SecretStoreError::not_found(key));
        }
        Ok(out.stdout)
    }

    fn exists(&self, key: &str) -> Result<bool, SecretStoreError> {
        match self.load(key) {
            Ok(value) => Ok(!value.is_empty()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(key))]
    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        let args = ["clear", self.app.id.as_str(), key];
        let out = self.runner.run(&self.program, &args, None)?;
        if !out.success() {
            return Err(tool_failure(&self.program, &args, &out));
        }
        Ok(())
    }
}
