//! File-based settings source.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::source::{SettingsSource, SourceEntry};
use super::SettingsError;

#[derive(Debug, Clone)]
enum Target {
    /// A concrete file path, honoring the `required` flag.
    Exact(PathBuf),
    /// A file name probed against an ordered list of directories; always
    /// optional, the first existing candidate wins.
    Search {
        file_name: String,
        dirs: Vec<PathBuf>,
    },
}

/// A settings source that loads a TOML file.
///
/// Files can be marked as required or optional. A required file that does not
/// exist is an error; an optional file that does not exist is silently
/// skipped. Files that exist but fail to parse are always an error.
#[derive(Debug, Clone)]
pub struct FileSource {
    target: Target,
    required: bool,
}

impl FileSource {
    /// Creates a source for a concrete file path.
    pub fn new(path: impl AsRef<Path>, required: bool) -> Self {
        Self {
            target: Target::Exact(path.as_ref().to_path_buf()),
            required,
        }
    }

    /// Creates a source that looks for `file_name` in each of `dirs` in order
    /// and loads the first match.
    ///
    /// Search sources are how local override files are found (the override
    /// convention probes the main settings directory and its parent). They
    /// are inherently optional: when no directory holds the file the source
    /// contributes nothing.
    pub fn find(
        file_name: impl Into<String>,
        dirs: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            target: Target::Search {
                file_name: file_name.into(),
                dirs: dirs.into_iter().collect(),
            },
            required: false,
        }
    }
}

impl SettingsSource for FileSource {
    fn entries(&self) -> Result<Vec<SourceEntry>, SettingsError> {
        let loaded = match &self.target {
            Target::Exact(path) => load_settings_file(path, self.required)?,
            Target::Search { file_name, dirs } => {
                match dirs.iter().map(|d| d.join(file_name)).find(|p| p.is_file()) {
                    Some(path) => load_settings_file(&path, false)?,
                    None => {
                        debug!("no {file_name} found, searched {dirs:?}");
                        None
                    }
                }
            }
        };
        Ok(loaded.map(SourceEntry::root).into_iter().collect())
    }
}

/// Loads and parses a TOML settings file.
///
/// Returns `Ok(None)` if the file doesn't exist and `required` is false.
fn load_settings_file(path: &Path, required: bool) -> Result<Option<toml::Table>, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let table = toml::from_str(&contents).map_err(|e| SettingsError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(Some(table))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                Err(SettingsError::FileNotFound(path.to_path_buf()))
            } else {
                debug!("optional settings file {} not found, skipped", path.display());
                Ok(None)
            }
        }
        Err(e) => Err(SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
