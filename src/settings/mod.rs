//! Settings loading, merging, and access.

use serde::de::DeserializeOwned;
use toml::{Table, Value};

mod builder;
mod env;
mod error;
mod file;
mod resolve;
mod source;

pub use builder::{SettingsBuilder, DEFAULT_LOCAL_OVERRIDES};
pub use env::EnvSource;
pub use error::SettingsError;
pub use file::FileSource;
pub use source::{SettingsSource, SourceEntry};

/// Well-known settings keys used by the loading pipeline.
pub mod keys {
    /// Session signing key, filled in by the secret key stage.
    pub const SECRET_KEY: &str = "secret_key";
    /// Application list, expanded against the registry.
    pub const INSTALLED_APPS: &str = "installed_apps";
    /// Template engine configuration array.
    pub const TEMPLATES: &str = "templates";
    /// Debug toggle, read by the template loader stage.
    pub const DEBUG: &str = "debug";
    /// Logging configuration table (`logging.colors` holds the palette).
    pub const LOGGING: &str = "logging";
}

/// The merged settings of an application.
///
/// Produced by [`SettingsBuilder::load`], after every source has been merged,
/// references resolved, and the post-processing stages (secret key, installed
/// apps, templates) have run. Values are kept as a TOML table, so settings can
/// be read individually or deserialized into a typed struct in one go.
///
/// ## Example
///
/// ```no_run
/// use settings_kit::Settings;
///
/// let settings = Settings::builder()
///     .with_file("settings.toml", true)
///     .with_local_overrides("local")
///     .load()?;
///
/// let debug = settings.get_bool("debug").unwrap_or(false);
/// # Ok::<(), settings_kit::SettingsError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    table: Table,
}

impl Settings {
    /// Creates a new builder for loading settings.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Creates empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.table.get(key)
    }

    /// Returns the value at a dotted path, e.g. `"database.port"`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut value = self.table.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    /// Returns the string at a dotted path, if present and a string.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path)?.as_str()
    }

    /// Returns the boolean at a dotted path, if present and a boolean.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_path(path)?.as_bool()
    }

    /// Returns the integer at a dotted path, if present and an integer.
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get_path(path)?.as_integer()
    }

    /// Returns the array at a dotted path, if present and an array.
    pub fn get_array(&self, path: &str) -> Option<&Vec<Value>> {
        self.get_path(path)?.as_array()
    }

    /// Returns the array of strings at a dotted path.
    ///
    /// `Ok(None)` if the path is absent; an error if the value is present but
    /// is not an array of strings.
    pub fn get_string_array(&self, path: &str) -> Result<Option<Vec<String>>, SettingsError> {
        let Some(value) = self.get_path(path) else {
            return Ok(None);
        };
        let mismatch = || SettingsError::TypeMismatch {
            key: path.to_string(),
            expected: "array of strings",
        };
        let items = value.as_array().ok_or_else(mismatch)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(item.as_str().ok_or_else(mismatch)?.to_string());
        }
        Ok(Some(out))
    }

    /// Sets a top-level key, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.table.insert(key.into(), value.into())
    }

    /// Returns whether a top-level key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Iterates over the top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Number of top-level settings.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Borrows the underlying table.
    pub fn as_table(&self) -> &Table {
        &self.table
    }

    /// Mutably borrows the underlying table.
    pub fn as_table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    /// Consumes the settings, returning the underlying table.
    pub fn into_table(self) -> Table {
        self.table
    }

    /// Deserializes the whole table into a typed struct.
    pub fn try_deserialize<T: DeserializeOwned>(self) -> Result<T, SettingsError> {
        Value::Table(self.table)
            .try_into()
            .map_err(SettingsError::Deserialize)
    }
}

impl From<Table> for Settings {
    fn from(table: Table) -> Self {
        Self { table }
    }
}
