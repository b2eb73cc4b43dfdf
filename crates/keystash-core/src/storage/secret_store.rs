use std::fmt;

use thiserror::Error;

/// Errors produced by secret-store backends and the resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    /// No platform secret facility is usable; the file fallback is in use.
    #[error("secrets not supported on this platform")]
    NotSupported,
    /// Requested key does not exist.
    #[error("secret not found for key: {key}")]
    NotFound { key: String },
    /// A platform facility's runtime component is absent.
    #[error("{0}")]
    PrerequisiteMissing(Prerequisite),
    /// Process, file or cipher failure, with the offending path or invocation.
    #[error("{context}: {reason}")]
    Io { context: String, reason: String },
}

impl SecretStoreError {
    pub fn not_found(key: &str) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Io {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error reports a missing platform facility. `NotSupported`
    /// counts too: on platforms without secret facilities it stands in for
    /// both prerequisite diagnostics.
    pub fn is_prerequisite_missing(&self) -> bool {
        matches!(self, Self::PrerequisiteMissing(_) | Self::NotSupported)
    }
}

/// Which piece of a platform facility is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    /// The session keyring daemon (e.g. `gnome-keyring`).
    Keyring,
    /// The command-line secret manager (`secret-tool`, `keyctl`).
    SecretManager,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prerequisite::Keyring => f.write_str("keyring not installed, using fallback"),
            Prerequisite::SecretManager => {
                f.write_str("secrets manager not installed, using fallback")
            }
        }
    }
}

/// Application a backend is bound to. `id` scopes every stored secret;
/// `description` is shown as a label by keychains that have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub id: String,
    pub description: String,
}

impl AppIdentity {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Concrete backend chosen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Native platform keychain.
    Keychain,
    /// Session-bus secret service driven through `secret-tool`.
    SecretService,
    /// Kernel persistent keyring driven through `keyctl`.
    Keyctl,
    /// Plain files under the application's storage root.
    File,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Keychain => "keychain",
            BackendKind::SecretService => "secret-service",
            BackendKind::Keyctl => "keyctl",
            BackendKind::File => "file",
        };
        f.write_str(name)
    }
}

/// Uniform contract for durable storage of small secret values.
///
/// Operations are synchronous and may block on an external process or the
/// filesystem. Callers issuing concurrent writes for the same key must
/// serialize them.
pub trait SecretStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError>;

    /// Retrieve the value for a key, or [`SecretStoreError::NotFound`].
    fn load(&self, key: &str) -> Result<Vec<u8>, SecretStoreError>;

    /// Whether a value is stored for the key. Never fails with `NotFound`.
    fn exists(&self, key: &str) -> Result<bool, SecretStoreError>;

    /// Remove a key and its value.
    ///
    /// Whether removing an absent key is an error depends on the backend: the
    /// file fallback treats it as success, command-line drivers report the
    /// tool's failure.
    fn delete(&self, key: &str) -> Result<(), SecretStoreError>;
}
