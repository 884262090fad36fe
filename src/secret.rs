//! Secret key generation and persistence.
//!
//! A host application needs a stable signing key, but the key must not be
//! checked into version control. The convention here: keep it in a small
//! file next to the settings, created automatically on first run.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::Rng;
use toml::Value;
use tracing::info;

use crate::settings::{keys, Settings, SettingsError};

/// Length of a generated secret key.
pub const SECRET_KEY_LEN: usize = 50;

/// Characters a generated secret key is sampled from.
pub const SECRET_KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*(-_=+)";

/// A secret key persisted to a single-line file.
///
/// [`ensure`](Self::ensure) fills the `secret_key` setting from the file,
/// creating the file with a freshly generated key when it doesn't exist. An
/// existing key is never overwritten, so the key stays stable across runs.
#[derive(Debug, Clone)]
pub struct SecretKeyFile {
    path: PathBuf,
    key_name: String,
}

impl SecretKeyFile {
    /// Creates a handle for the key file at `path`, feeding the
    /// [`secret_key`](crate::settings::keys::SECRET_KEY) setting.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key_name: keys::SECRET_KEY.to_string(),
        }
    }

    /// Uses a different settings key than `secret_key`.
    pub fn with_key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Makes sure `settings` carry a secret key.
    ///
    /// Any value already in the settings wins and the file is left alone;
    /// a string only counts when non-blank. Otherwise the key is read from
    /// the file; a missing (or empty) file gets a freshly generated key
    /// written to it, single line. Failing to read or create the file is an
    /// error: a host that asked for a persisted key must not start with an
    /// ephemeral one.
    pub fn ensure(&self, settings: &mut Settings) -> Result<(), SettingsError> {
        let present = match settings.get(&self.key_name) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
            None => false,
        };
        if present {
            return Ok(());
        }

        let key = match read_key_file(&self.path)? {
            Some(key) => key,
            None => {
                let key = generate_secret_key();
                write_key_file(&self.path, &key)?;
                info!("secret key file created at {}", self.path.display());
                key
            }
        };
        settings.set(self.key_name.clone(), key);
        Ok(())
    }
}

/// Generates a random secret key: [`SECRET_KEY_LEN`] characters sampled
/// uniformly from [`SECRET_KEY_CHARSET`].
pub fn generate_secret_key() -> String {
    let mut rng = OsRng;
    (0..SECRET_KEY_LEN)
        .map(|_| SECRET_KEY_CHARSET[rng.gen_range(0..SECRET_KEY_CHARSET.len())] as char)
        .collect()
}

/// Reads the first line of the key file, trimmed.
///
/// A missing file and an empty file both count as "no key yet".
fn read_key_file(path: &Path) -> Result<Option<String>, SettingsError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let key = contents.lines().next().unwrap_or("").trim().to_string();
            Ok((!key.is_empty()).then_some(key))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SettingsError::SecretKeyIo {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn write_key_file(path: &Path, key: &str) -> Result<(), SettingsError> {
    fs::write(path, format!("{key}\n")).map_err(|e| SettingsError::SecretKeyIo {
        path: path.to_path_buf(),
        source: e,
    })
}
