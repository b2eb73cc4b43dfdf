//! Picks the best available secret backend for the current platform.
//!
//! - macOS: the native keychain, always.
//! - Linux: secret service (`secret-tool`), then the kernel persistent keyring
//!   (`keyctl`), then the file fallback.
//! - Anything else: the file fallback, without a diagnostic.
//!
//! Resolution always yields a usable backend. When a platform facility was
//! skipped, the reason is returned alongside as an advisory diagnostic.

use std::{fmt, path::PathBuf, sync::Arc};

use keystash_core::storage::{AppIdentity, BackendKind, SecretStore, SecretStoreError};
use tracing::{debug, warn};

use crate::{
    config::{default_storage_root, ConfigError, SecretsConfig},
    crypt::Cryptor,
    file_store::FileSecretStore,
    keychain::{keychain_store, Keychain, SystemKeychain},
    keyctl::{probe_keyctl, KeyctlStore},
    process::{CommandRunner, SystemRunner},
    secret_tool::{probe_secret_service, SecretToolStore},
};

/// Outcome of backend resolution.
pub struct Resolution {
    /// Always usable, even when `diagnostic` is set.
    pub backend: Box<dyn SecretStore>,
    pub kind: BackendKind,
    /// Why a higher-priority facility was skipped. Informational only.
    pub diagnostic: Option<SecretStoreError>,
}

impl Resolution {
    fn chosen(kind: BackendKind, backend: impl SecretStore + 'static) -> Self {
        debug!(%kind, "secret backend selected");
        Self {
            backend: Box::new(backend),
            kind,
            diagnostic: None,
        }
    }

    pub fn into_parts(self) -> (Box<dyn SecretStore>, Option<SecretStoreError>) {
        (self.backend, self.diagnostic)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("kind", &self.kind)
            .field("diagnostic", &self.diagnostic)
            .finish_non_exhaustive()
    }
}

/// Resolve a backend for `app` using the system runner and keychain.
/// Fails only when `config` itself is invalid.
pub fn resolve(app: &AppIdentity, config: &SecretsConfig) -> Result<Resolution, ConfigError> {
    Ok(Resolver::from_config(config)?.resolve(app))
}

/// Backend resolver with injectable process runner and keychain.
pub struct Resolver {
    runner: Arc<dyn CommandRunner>,
    keychain: Arc<dyn Keychain>,
    storage_root: Option<PathBuf>,
    cryptor: Option<Cryptor>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            runner: Arc::new(SystemRunner),
            keychain: Arc::new(SystemKeychain),
            storage_root: None,
            cryptor: None,
        }
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SecretsConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            storage_root: config.storage_root.clone(),
            cryptor: config.fallback_cryptor()?,
            ..Self::default()
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_keychain(mut self, keychain: Arc<dyn Keychain>) -> Self {
        self.keychain = keychain;
        self
    }

    /// Root under which fallback files are written.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Encrypt fallback files with `cryptor`.
    pub fn with_cryptor(mut self, cryptor: Cryptor) -> Self {
        self.cryptor = Some(cryptor);
        self
    }

    /// Resolve for the platform this binary was built for.
    pub fn resolve(&self, app: &AppIdentity) -> Resolution {
        #[cfg(target_os = "macos")]
        {
            self.resolve_macos(app)
        }
        #[cfg(target_os = "linux")]
        {
            self.resolve_linux(app)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            self.resolve_unsupported(app)
        }
    }

    /// Native keychain. The wrapper is linked in, so nothing is probed.
    pub fn resolve_macos(&self, app: &AppIdentity) -> Resolution {
        Resolution::chosen(
            BackendKind::Keychain,
            keychain_store(self.keychain.clone(), &app.id),
        )
    }

    /// Secret service, then keyctl, then the file fallback. Each probe runs
    /// once. On fallback the first diagnostic encountered is returned.
    pub fn resolve_linux(&self, app: &AppIdentity) -> Resolution {
        let secret_service_err = match probe_secret_service(self.runner.as_ref()) {
            Ok(program) => {
                return Resolution::chosen(
                    BackendKind::SecretService,
                    SecretToolStore::new(self.runner.clone(), program, app.clone()),
                )
            }
            Err(err) => err,
        };
        debug!(reason = %secret_service_err, "secret service unavailable");

        let keyctl_err = match probe_keyctl(self.runner.as_ref())
            .and_then(|program| KeyctlStore::new(self.runner.clone(), program))
        {
            Ok(store) => return Resolution::chosen(BackendKind::Keyctl, store),
            Err(err) => err,
        };
        debug!(reason = %keyctl_err, "kernel keyring unavailable");

        warn!(reason = %secret_service_err, "no secure secret backend, using file fallback");
        self.degraded(app, secret_service_err)
    }

    /// File fallback. No facility is probed here, so there is no diagnostic.
    pub fn resolve_unsupported(&self, app: &AppIdentity) -> Resolution {
        warn!("secrets not supported on this platform, using file fallback");
        Resolution {
            backend: Box::new(self.fallback(app)),
            kind: BackendKind::File,
            diagnostic: None,
        }
    }

    /// The file fallback for `app`.
    pub fn fallback(&self, app: &AppIdentity) -> FileSecretStore {
        let root = self
            .storage_root
            .clone()
            .or_else(|| default_storage_root(&app.id))
            .unwrap_or_else(|| {
                let root = std::env::temp_dir().join(&app.id);
                warn!(?root, "no data dir available, fallback secrets go to temp dir");
                root
            });
        debug!(?root, encrypted = self.cryptor.is_some(), "file fallback");
        match &self.cryptor {
            Some(cryptor) => FileSecretStore::encrypted(root, cryptor.clone()),
            None => FileSecretStore::new(root),
        }
    }

    fn degraded(&self, app: &AppIdentity, diagnostic: SecretStoreError) -> Resolution {
        Resolution {
            backend: Box::new(self.fallback(app)),
            kind: BackendKind::File,
            diagnostic: Some(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use keystash_core::storage::Prerequisite;

    use super::*;
    use crate::{
        keychain::testing::MemoryKeychain,
        keyctl::KEYCTL,
        process::testing::ScriptedRunner,
        secret_tool::{KEYRING_DAEMON, SECRET_TOOL},
    };

    fn app() -> AppIdentity {
        AppIdentity::new("app-id", "app description")
    }

    fn resolver(runner: ScriptedRunner, root: &std::path::Path) -> (Arc<ScriptedRunner>, Resolver) {
        let runner = Arc::new(runner);
        let resolver = Resolver::new()
            .with_runner(runner.clone())
            .with_keychain(Arc::new(MemoryKeychain::default()))
            .with_storage_root(root);
        (runner, resolver)
    }

    #[test]
    fn linux_prefers_secret_service() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new()
            .installed(KEYRING_DAEMON)
            .installed(SECRET_TOOL)
            .installed(KEYCTL);
        let (runner, resolver) = resolver(runner, dir.path());

        let resolution = resolver.resolve_linux(&app());
        assert_eq!(resolution.kind, BackendKind::SecretService);
        assert_eq!(resolution.diagnostic, None);
        // probing spawns nothing
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn linux_uses_keyctl_without_secret_service() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new()
            .installed(KEYCTL)
            .reply(0, "812254473\n");
        let (runner, resolver) = resolver(runner, dir.path());

        let resolution = resolver.resolve_linux(&app());
        assert_eq!(resolution.kind, BackendKind::Keyctl);
        assert_eq!(resolution.diagnostic, None);
        assert_eq!(runner.args(), vec![vec!["get_persistent", "@u"]]);
    }

    #[test]
    fn linux_falls_back_with_first_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_, resolver) = resolver(ScriptedRunner::new(), dir.path());

        let resolution = resolver.resolve_linux(&app());
        assert_eq!(resolution.kind, BackendKind::File);
        assert_eq!(
            resolution.diagnostic,
            Some(SecretStoreError::PrerequisiteMissing(Prerequisite::Keyring))
        );
    }

    #[test]
    fn linux_reports_missing_secret_tool_over_keyctl_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new()
            .installed(KEYRING_DAEMON)
            .installed(KEYCTL)
            .reply(1, "Operation not supported");
        let (runner, resolver) = resolver(runner, dir.path());

        let resolution = resolver.resolve_linux(&app());
        assert_eq!(resolution.kind, BackendKind::File);
        assert_eq!(
            resolution.diagnostic,
            Some(SecretStoreError::PrerequisiteMissing(
                Prerequisite::SecretManager
            ))
        );
        // keyctl was still tried once
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn fallback_backend_is_usable_despite_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_, resolver) = resolver(ScriptedRunner::new(), dir.path());

        let (backend, diagnostic) = resolver.resolve_linux(&app()).into_parts();
        assert!(diagnostic.is_some());

        backend.store("t1", b"hello").expect("store");
        assert_eq!(backend.load("t1").expect("load"), b"hello");
        assert!(backend.exists("t1").expect("exists"));
        backend.delete("t1").expect("delete");
        assert!(!backend.exists("t1").expect("exists after delete"));
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn unsupported_platform_returns_fallback_without_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, resolver) = resolver(ScriptedRunner::new(), dir.path());

        let resolution = resolver.resolve_unsupported(&app());
        assert_eq!(resolution.kind, BackendKind::File);
        assert_eq!(resolution.diagnostic, None);
        assert!(runner.calls().is_empty());
        resolution.backend.store("k", b"v").expect("fallback usable");
        assert_eq!(resolution.backend.load("k").expect("load"), b"v");
    }

    #[test]
    fn macos_returns_keychain_without_probing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, resolver) = resolver(ScriptedRunner::new(), dir.path());

        let resolution = resolver.resolve_macos(&app());
        assert_eq!(resolution.kind, BackendKind::Keychain);
        assert_eq!(resolution.diagnostic, None);
        resolution.backend.store("t1", b"hello").expect("store");
        assert_eq!(resolution.backend.load("t1").expect("load"), b"hello");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn configured_key_encrypts_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SecretsConfig {
            storage_root: Some(dir.path().to_path_buf()),
            fallback_key: Some(crate::crypt::generate_key()),
        };
        let resolver = Resolver::from_config(&config)
            .expect("valid config")
            .with_runner(Arc::new(ScriptedRunner::new()));

        let store = resolver.fallback(&app());
        assert!(store.is_encrypted());
        assert_eq!(store.root(), dir.path());
    }
}
