use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use toml::Table;

use crate::apps::{self, AppRegistry};
use crate::secret::SecretKeyFile;
use crate::templates::{self, DEFAULT_TEMPLATE_BACKEND};

use super::file::FileSource;
use super::resolve::resolve_references;
use super::source::{merge_at_path, SettingsSource};
use super::{EnvSource, Settings, SettingsError};

/// Conventional stem for local override files (`local.toml`).
pub const DEFAULT_LOCAL_OVERRIDES: &str = "local";

/// Builder for loading settings from layered sources.
///
/// Sources are merged in registration order, with later sources overriding
/// earlier ones. Nested tables are merged recursively; other values
/// (including arrays) are replaced entirely. After merging, the builder
/// resolves references, fills in the secret key, and applies the registered
/// apps' fixes to `installed_apps` and `templates`.
///
/// ## Setting References
///
/// String values can reference settings merged from any source using
/// `${path.to.setting}` syntax, so an override file can build on the values
/// it overrides:
///
/// ```toml
/// [database]
/// host = "db.internal"
/// name = "app"
/// url = "postgres://${database.host}/${database.name}"
/// ```
///
/// Use `$$` to escape a literal `$` (e.g., `$${VAR}` becomes `${VAR}`).
///
/// ## Example
///
/// ```no_run
/// use settings_kit::{AppDescriptor, AppRegistry, Settings};
///
/// let registry = AppRegistry::from_iter([
///     AppDescriptor::new("auth").requires(["sessions"]),
///     AppDescriptor::new("sessions"),
/// ]);
///
/// let settings = Settings::builder()
///     .with_file("config/settings.toml", true)
///     .with_env("APP", "__")
///     .with_local_overrides("local")
///     .with_secret_key_file("config/secret.txt")
///     .with_app_registry(registry)
///     .load()?;
/// # Ok::<(), settings_kit::SettingsError>(())
/// ```
#[derive(Debug, Default)]
#[must_use = "builders do nothing until .load() is called"]
pub struct SettingsBuilder {
    sources: Vec<Box<dyn SettingsSource>>,
    last_file_dir: Option<PathBuf>,
    secret_key: Option<SecretKeyFile>,
    registry: Option<AppRegistry>,
}

impl SettingsBuilder {
    /// Adds a TOML file to be loaded.
    ///
    /// If `required` is `true`, the load fails when the file doesn't exist.
    /// Optional files that are missing are silently skipped.
    ///
    /// Sources are applied in registration order, so later sources override
    /// earlier ones.
    pub fn with_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        let path = path.as_ref();
        self.record_file_dir(path);
        self.sources.push(Box::new(FileSource::new(path, required)));
        self
    }

    /// Adds an optional local override file, searched for by convention.
    ///
    /// `stem` names the file; without an extension, `.toml` is appended. The
    /// file is looked for in the directory of the most recently registered
    /// file and in that directory's parent, and the first match is merged.
    /// No match is fine: local overrides are a per-machine convenience, not
    /// a requirement.
    ///
    /// ```no_run
    /// # use settings_kit::Settings;
    /// // merges config/local.toml, or ../local.toml, when present
    /// let settings = Settings::builder()
    ///     .with_file("config/settings.toml", true)
    ///     .with_local_overrides("local")
    ///     .load()?;
    /// # Ok::<(), settings_kit::SettingsError>(())
    /// ```
    pub fn with_local_overrides(mut self, stem: impl Into<String>) -> Self {
        let mut file_name = stem.into();
        if Path::new(&file_name).extension().is_none() {
            file_name.push_str(".toml");
        }
        let dirs = self.local_override_dirs();
        self.sources.push(Box::new(FileSource::find(file_name, dirs)));
        self
    }

    /// Loads settings from environment variables with the given prefix.
    ///
    /// Variable names are mapped to settings paths by stripping the prefix
    /// and splitting the rest on the separator, lowercased: with prefix
    /// `"APP"` and separator `"__"`, `APP__DATABASE__HOST` becomes
    /// `database.host`. Values are parsed as TOML values (integers, floats,
    /// booleans, arrays, quoted strings) and fall back to plain strings.
    ///
    /// Sources are applied in registration order, which allows layering:
    ///
    /// ```no_run
    /// # use settings_kit::Settings;
    /// // defaults -> env overrides -> local file overrides env
    /// let settings = Settings::builder()
    ///     .with_file("config/settings.toml", true)
    ///     .with_env("APP", "__")
    ///     .with_local_overrides("local")
    ///     .load()?;
    /// # Ok::<(), settings_kit::SettingsError>(())
    /// ```
    pub fn with_env(mut self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.sources.push(Box::new(EnvSource::new(prefix, separator)));
        self
    }

    /// Adds a custom settings source.
    ///
    /// Use this for a pre-configured [`EnvSource`] (e.g. with ignored
    /// variables) or a source of your own.
    pub fn with_source(mut self, source: impl SettingsSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Ensures settings carry a secret key, persisting it to `path`.
    ///
    /// A `secret_key` provided by the sources wins. Otherwise the file is
    /// read; when missing, a key is generated and the file created. An
    /// existing key file is never overwritten.
    pub fn with_secret_key_file(mut self, path: impl AsRef<Path>) -> Self {
        self.secret_key = Some(SecretKeyFile::new(path));
        self
    }

    /// Attaches an app registry for the post-merge fixes.
    ///
    /// With a registry attached, `load()` expands `installed_apps` through
    /// each app's requirements, injects the apps' template context
    /// processors, and wraps template loaders in the cached loader for
    /// non-debug runs.
    pub fn with_app_registry(mut self, registry: AppRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Loads and merges all sources, then runs the post-merge stages.
    ///
    /// Stage order: merge sources in registration order, resolve `${...}`
    /// references, ensure the secret key, apply the app registry fixes.
    pub fn load(self) -> Result<Settings, SettingsError> {
        let mut merged = Table::new();

        for source in &self.sources {
            for entry in source.entries()? {
                merge_at_path(&mut merged, &entry.path, entry.value);
            }
        }

        // Resolve ${...} references after all sources are merged
        resolve_references(&mut merged)?;

        let mut settings = Settings::from(merged);

        if let Some(secret) = &self.secret_key {
            secret.ensure(&mut settings)?;
        }

        if let Some(registry) = &self.registry {
            apps::update_installed_apps(&mut settings, registry)?;
            templates::add_context_processors(&mut settings, registry)?;
            templates::cache_template_loaders(&mut settings, &[DEFAULT_TEMPLATE_BACKEND])?;
        }

        Ok(settings)
    }

    /// Loads the settings and deserializes them into a typed struct.
    ///
    /// This performs deserialization once at load time rather than on each
    /// access, making subsequent reads zero-cost.
    pub fn build<T: DeserializeOwned>(self) -> Result<T, SettingsError> {
        self.load()?.try_deserialize()
    }

    fn record_file_dir(&mut self, path: &Path) {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        self.last_file_dir = Some(dir);
    }

    /// The directory of the most recently registered file and its parent,
    /// falling back to the working directory.
    fn local_override_dirs(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.last_file_dir else {
            return vec![PathBuf::from(".")];
        };
        let mut dirs = vec![dir.clone()];
        if let Some(parent) = dir.parent() {
            let parent = if parent.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                parent.to_path_buf()
            };
            if !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::AppDescriptor;
    use crate::secret::SECRET_KEY_LEN;
    use serial_test::serial;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_files_merge_in_registration_order() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let overlay = dir.path().join("overlay.toml");
        fs::write(
            &base,
            r#"
            name = "demo"

            [server]
            host = "localhost"
            port = 8000
            "#,
        )
        .unwrap();
        fs::write(
            &overlay,
            r#"
            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let settings = Settings::builder()
            .with_file(&base, true)
            .with_file(&overlay, true)
            .load()
            .unwrap();

        assert_eq!(settings.get_str("name"), Some("demo"));
        assert_eq!(settings.get_str("server.host"), Some("localhost"));
        assert_eq!(settings.get_i64("server.port"), Some(9000));
    }

    #[test]
    fn test_local_overrides_next_to_settings_file() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config");
        fs::create_dir(&config).unwrap();
        fs::write(config.join("settings.toml"), r#"debug = false"#).unwrap();
        fs::write(config.join("local.toml"), r#"debug = true"#).unwrap();

        let settings = Settings::builder()
            .with_file(config.join("settings.toml"), true)
            .with_local_overrides("local")
            .load()
            .unwrap();

        assert_eq!(settings.get_bool("debug"), Some(true));
    }

    #[test]
    fn test_local_overrides_found_in_parent_dir() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config");
        fs::create_dir(&config).unwrap();
        fs::write(config.join("settings.toml"), r#"debug = false"#).unwrap();
        fs::write(dir.path().join("local.toml"), r#"debug = true"#).unwrap();

        let settings = Settings::builder()
            .with_file(config.join("settings.toml"), true)
            .with_local_overrides("local")
            .load()
            .unwrap();

        assert_eq!(settings.get_bool("debug"), Some(true));
    }

    #[test]
    fn test_missing_local_overrides_skipped() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("settings.toml");
        fs::write(&base, r#"debug = false"#).unwrap();

        let settings = Settings::builder()
            .with_file(&base, true)
            .with_local_overrides(DEFAULT_LOCAL_OVERRIDES)
            .load()
            .unwrap();

        assert_eq!(settings.get_bool("debug"), Some(false));
    }

    #[test]
    #[serial]
    fn test_env_layering_between_files() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let late = dir.path().join("late.toml");
        fs::write(
            &base,
            r#"
            [server]
            host = "base"
            port = 1
            "#,
        )
        .unwrap();
        fs::write(
            &late,
            r#"
            [server]
            host = "late"
            "#,
        )
        .unwrap();

        std::env::set_var("SKT_F__SERVER__PORT", "7777");
        let settings = Settings::builder()
            .with_file(&base, true)
            .with_env("SKT_F", "__")
            .with_file(&late, true)
            .load()
            .unwrap();
        std::env::remove_var("SKT_F__SERVER__PORT");

        assert_eq!(settings.get_i64("server.port"), Some(7777));
        assert_eq!(settings.get_str("server.host"), Some("late"));
    }

    #[test]
    fn test_references_resolve_across_sources() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let local = dir.path().join("local.toml");
        fs::write(&base, r#"host = "localhost""#).unwrap();
        fs::write(&local, r#"url = "http://${host}/api""#).unwrap();

        let settings = Settings::builder()
            .with_file(&base, true)
            .with_file(&local, true)
            .load()
            .unwrap();

        assert_eq!(settings.get_str("url"), Some("http://localhost/api"));
    }

    #[test]
    fn test_empty_builder_yields_empty_settings() {
        let settings = Settings::builder().load().unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn test_required_file_missing_fails() {
        let dir = tempdir().unwrap();
        let result = Settings::builder()
            .with_file(dir.path().join("absent.toml"), true)
            .load();
        assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
    }

    #[test]
    fn test_build_typed() {
        #[derive(serde::Deserialize)]
        struct AppConfig {
            name: String,
            port: u16,
        }

        let dir = tempdir().unwrap();
        let base = dir.path().join("settings.toml");
        fs::write(
            &base,
            r#"
            name = "demo"
            port = 8080
            "#,
        )
        .unwrap();

        let config: AppConfig = Settings::builder().with_file(&base, true).build().unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_secret_key_stage_fills_and_persists() {
        let dir = tempdir().unwrap();
        let key_file = dir.path().join("secret.txt");

        let settings = Settings::builder()
            .with_secret_key_file(&key_file)
            .load()
            .unwrap();

        let key = settings.get_str("secret_key").unwrap();
        assert_eq!(key.len(), SECRET_KEY_LEN);
        assert_eq!(fs::read_to_string(&key_file).unwrap().trim(), key);
    }

    #[test]
    fn test_registry_stage_expands_installed_apps() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("settings.toml");
        fs::write(&base, r#"installed_apps = ["auth"]"#).unwrap();

        let registry = AppRegistry::from_iter([
            AppDescriptor::new("auth").requires(["sessions"]),
            AppDescriptor::new("sessions"),
        ]);

        let settings = Settings::builder()
            .with_file(&base, true)
            .with_app_registry(registry)
            .load()
            .unwrap();

        let apps = settings.get_string_array("installed_apps").unwrap().unwrap();
        assert_eq!(apps, vec!["sessions".to_string(), "auth".to_string()]);
    }
}
