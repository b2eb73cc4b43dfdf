//! File-backed fallback used when no platform secret facility is available.
//!
//! Each secret is one file at `<root>/data/<key>.txt`. Values are written raw
//! unless the store was built with a [`Cryptor`], in which case the file holds
//! the encrypted text form.

use std::{
    fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use keystash_core::storage::{SecretStore, SecretStoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::crypt::Cryptor;

const DATA_DIR: &str = "data";
const EXTENSION: &str = "txt";

pub struct FileSecretStore {
    root: PathBuf,
    cryptor: Option<Cryptor>,
}

impl FileSecretStore {
    /// Plaintext store under `root` (the application's private storage root).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cryptor: None,
        }
    }

    /// Store that encrypts every value at rest with `cryptor`.
    pub fn encrypted(root: impl Into<PathBuf>, cryptor: Cryptor) -> Self {
        Self {
            root: root.into(),
            cryptor: Some(cryptor),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_encrypted(&self) -> bool {
        self.cryptor.is_some()
    }

    /// `<root>/data/<key>.txt`. Keys may contain `/` to create subdirectories
    /// but must stay inside the data directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, SecretStoreError> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SecretStoreError::io(
                format!("invalid key {key:?}"),
                "keys must be relative paths without `..`",
            ));
        }
        Ok(self
            .root
            .join(DATA_DIR)
            .join(format!("{key}.{EXTENSION}")))
    }
}

impl SecretStore for FileSecretStore {
    #[instrument(skip_all, fields(key))]
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        let path = self.path_for(key)?;
        match &self.cryptor {
            Some(cryptor) => write_atomic(&path, cryptor.encrypt(value)?.as_bytes()),
            None => write_atomic(&path, value),
        }
    }

    #[instrument(skip_all, fields(key))]
    fn load(&self, key: &str) -> Result<Vec<u8>, SecretStoreError> {
        let path = self.path_for(key)?;
        let bytes = fs::read(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SecretStoreError::not_found(key)
            } else {
                path_err(&path, err)
            }
        })?;

        match &self.cryptor {
            Some(cryptor) => {
                let text = std::str::from_utf8(&bytes).map_err(|e| path_err(&path, e))?;
                Ok(cryptor.decrypt(text)?)
            }
            None => Ok(bytes),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, SecretStoreError> {
        let path = self.path_for(key)?;
        path.try_exists().map_err(|e| path_err(&path, e))
    }

    #[instrument(skip_all, fields(key))]
    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(path_err(&path, err)),
        }
    }
}

/// Write through a temp file in the target directory, so readers never see a
/// partial value. The temp file is created owner-only on unix.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), SecretStoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| path_err(path, "invalid storage path"))?;
    // create_dir_all already tolerates an existing directory
    fs::create_dir_all(parent).map_err(|e| path_err(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| path_err(parent, e))?;
    tmp.write_all(data).map_err(|e| path_err(path, e))?;
    tmp.flush().map_err(|e| path_err(path, e))?;
    tmp.persist(path).map_err(|e| path_err(path, e.error))?;
    Ok(())
}

fn path_err<E: ToString>(path: &Path, err: E) -> SecretStoreError {
    SecretStoreError::io(path.display().to_string(), err)
}
