use std::{
    fs,
    path::{Path, PathBuf},
};

use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypt::{CryptError, Cryptor};

const CONFIG_FILE: &str = "secrets.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config dir available")]
    NoConfigDir,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid fallback_key: {0}")]
    FallbackKey(#[from] CryptError),
}

/// Per-application settings, loaded from `<config dir>/<app id>/secrets.toml`
/// (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SecretsConfig {
    /// Override for the fallback storage root.
    pub storage_root: Option<PathBuf>,
    /// Encoded key (see `crypt::generate_key`) used to encrypt fallback files.
    /// Fallback files are written in plaintext when absent.
    pub fallback_key: Option<String>,
}

impl SecretsConfig {
    /// Cryptor for the fallback store, if a key is configured.
    pub fn fallback_cryptor(&self) -> Result<Option<Cryptor>, ConfigError> {
        self.fallback_key
            .clone()
            .map(|key| Cryptor::new(Some(key)))
            .transpose()
            .map_err(ConfigError::from)
    }
}

/// Load config for `app_id` from the default path; if missing, return defaults.
pub fn load(app_id: &str) -> Result<SecretsConfig, ConfigError> {
    load_from_path(default_path(app_id)?)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<SecretsConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(SecretsConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(SecretsConfig::default());
    }
    let cfg: SecretsConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    // reject a bad key at load time rather than on first fallback write
    cfg.fallback_cryptor()?;
    Ok(cfg)
}

/// Platform data dir for `app_id`, e.g. `~/.local/share/<app id>`.
pub fn default_storage_root(app_id: &str) -> Option<PathBuf> {
    data_dir().map(|base| base.join(app_id))
}

/// Resolve the default config path for `app_id` (platform aware).
pub fn default_path(app_id: &str) -> Result<PathBuf, ConfigError> {
    let base = config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join(app_id).join(CONFIG_FILE))
}

/// Write `config` to `path`, creating parent directories as needed.
/// An existing file is left untouched.
pub fn write_if_missing(config: &SecretsConfig, path: &Path) -> Result<PathBuf, ConfigError> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body).map_err(io_err)?;
    Ok(path.to_path_buf())
}
