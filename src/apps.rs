//! App registry and installed-apps expansion.
//!
//! Reusable apps often depend on other apps being installed (an `auth` app
//! needing `sessions`, say). Rather than making every host list the full
//! closure by hand, an app declares its requirements in an [`AppDescriptor`]
//! and the settings pipeline expands `installed_apps` so that every
//! requirement precedes the apps that need it.

use std::collections::{BTreeMap, HashSet};

use toml::Value;
use tracing::debug;

use crate::settings::{keys, Settings, SettingsError};

/// Template context processors declared by an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorDecl {
    /// Processors for the default template backend.
    Default(Vec<String>),
    /// Processors keyed by backend identifier.
    PerBackend(BTreeMap<String, Vec<String>>),
}

/// Metadata an app contributes to the settings pipeline.
///
/// ```
/// use settings_kit::AppDescriptor;
///
/// let app = AppDescriptor::new("auth")
///     .requires(["sessions"])
///     .context_processors(["auth.context.user"]);
/// assert_eq!(app.name(), "auth");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    name: String,
    requires: Vec<String>,
    processors: Option<ProcessorDecl>,
}

impl AppDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            processors: None,
        }
    }

    /// Adds apps this app needs installed before it.
    pub fn requires<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(apps.into_iter().map(Into::into));
        self
    }

    /// Declares context processors for the default template backend.
    pub fn context_processors<I, S>(mut self, processors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processors = Some(ProcessorDecl::Default(
            processors.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Declares context processors for a specific template backend.
    ///
    /// May be called once per backend; repeat calls for the same backend
    /// append. Replaces a plain [`context_processors`](Self::context_processors)
    /// declaration.
    pub fn context_processors_for<I, S>(mut self, backend: impl Into<String>, processors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = match self.processors.take() {
            Some(ProcessorDecl::PerBackend(map)) => map,
            _ => BTreeMap::new(),
        };
        map.entry(backend.into())
            .or_default()
            .extend(processors.into_iter().map(Into::into));
        self.processors = Some(ProcessorDecl::PerBackend(map));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &[String] {
        &self.requires
    }

    pub fn processors(&self) -> Option<&ProcessorDecl> {
        self.processors.as_ref()
    }
}

/// The apps known to the settings pipeline, by name.
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: BTreeMap<String, AppDescriptor>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an app, returning the previously registered descriptor of
    /// the same name if any.
    pub fn register(&mut self, app: AppDescriptor) -> Option<AppDescriptor> {
        self.apps.insert(app.name.clone(), app)
    }

    pub fn get(&self, name: &str) -> Option<&AppDescriptor> {
        self.apps.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.apps.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Iterates over the registered apps in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AppDescriptor> {
        self.apps.values()
    }
}

impl FromIterator<AppDescriptor> for AppRegistry {
    fn from_iter<I: IntoIterator<Item = AppDescriptor>>(iter: I) -> Self {
        let mut registry = Self::new();
        for app in iter {
            registry.register(app);
        }
        registry
    }
}

/// Expands an app list through each app's requirements, depth first.
///
/// Every requirement ends up before the apps that need it; the first
/// occurrence of a name wins and later ones are dropped. Names absent from
/// the registry pass through with no requirements. Requirement cycles
/// terminate: an app already being visited is not descended into again.
pub fn expand_installed_apps<I, S>(installed: I, registry: &AppRegistry) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut expanded = Vec::new();
    let mut visited = HashSet::new();
    for app in installed {
        visit(app.as_ref(), registry, &mut visited, &mut expanded);
    }
    expanded
}

fn visit(name: &str, registry: &AppRegistry, visited: &mut HashSet<String>, out: &mut Vec<String>) {
    if !visited.insert(name.to_string()) {
        return;
    }
    if let Some(app) = registry.get(name) {
        for requirement in app.requirements() {
            visit(requirement, registry, visited, out);
        }
    }
    out.push(name.to_string());
}

/// Rewrites the `installed_apps` setting with its expansion.
///
/// An absent or empty list is a no-op; a value of any other shape under the
/// key is an error.
pub fn update_installed_apps(
    settings: &mut Settings,
    registry: &AppRegistry,
) -> Result<(), SettingsError> {
    let Some(installed) = settings.get_string_array(keys::INSTALLED_APPS)? else {
        return Ok(());
    };
    if installed.is_empty() {
        return Ok(());
    }

    let expanded = expand_installed_apps(&installed, registry);
    if expanded != installed {
        debug!("installed_apps expanded to {} entries", expanded.len());
    }
    settings.set(
        keys::INSTALLED_APPS,
        Value::Array(expanded.into_iter().map(Value::String).collect()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AppRegistry {
        AppRegistry::from_iter([
            AppDescriptor::new("auth").requires(["sessions", "users"]),
            AppDescriptor::new("users").requires(["sessions"]),
            AppDescriptor::new("sessions"),
        ])
    }

    #[test]
    fn test_requirements_precede_dependents() {
        let expanded = expand_installed_apps(["auth"], &registry());
        assert_eq!(expanded, vec!["sessions", "users", "auth"]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let expanded = expand_installed_apps(["auth", "sessions", "users"], &registry());
        assert_eq!(expanded, vec!["sessions", "users", "auth"]);
    }

    #[test]
    fn test_unknown_apps_pass_through() {
        let expanded = expand_installed_apps(["blog", "auth"], &registry());
        assert_eq!(expanded, vec!["blog", "sessions", "users", "auth"]);
    }

    #[test]
    fn test_requirement_cycles_terminate() {
        let registry = AppRegistry::from_iter([
            AppDescriptor::new("a").requires(["b"]),
            AppDescriptor::new("b").requires(["a"]),
        ]);
        let expanded = expand_installed_apps(["a"], &registry);
        assert_eq!(expanded, vec!["b", "a"]);
    }

    #[test]
    fn test_diamond_requirements_deduplicated() {
        let registry = AppRegistry::from_iter([
            AppDescriptor::new("top").requires(["left", "right"]),
            AppDescriptor::new("left").requires(["base"]),
            AppDescriptor::new("right").requires(["base"]),
            AppDescriptor::new("base"),
        ]);
        let expanded = expand_installed_apps(["top"], &registry);
        assert_eq!(expanded, vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_update_rewrites_installed_apps() {
        let mut settings = Settings::new();
        settings.set(
            "installed_apps",
            Value::Array(vec![Value::String("auth".into())]),
        );

        update_installed_apps(&mut settings, &registry()).unwrap();

        let apps = settings.get_string_array("installed_apps").unwrap().unwrap();
        assert_eq!(apps, vec!["sessions", "users", "auth"]);
    }

    #[test]
    fn test_update_without_installed_apps_is_noop() {
        let mut settings = Settings::new();
        update_installed_apps(&mut settings, &registry()).unwrap();
        assert!(settings.is_empty());
    }

    #[test]
    fn test_update_rejects_wrong_shape() {
        let mut settings = Settings::new();
        settings.set("installed_apps", "auth");
        let result = update_installed_apps(&mut settings, &registry());
        assert!(matches!(result, Err(SettingsError::TypeMismatch { .. })));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = AppRegistry::new();
        registry.register(AppDescriptor::new("auth"));
        let previous = registry.register(AppDescriptor::new("auth").requires(["sessions"]));
        assert!(previous.is_some());
        assert_eq!(
            registry.get("auth").map(AppDescriptor::requirements),
            Some(["sessions".to_string()].as_slice())
        );
    }

    #[test]
    fn test_processor_declarations() {
        let plain = AppDescriptor::new("auth").context_processors(["auth.context.user"]);
        assert_eq!(
            plain.processors(),
            Some(&ProcessorDecl::Default(vec!["auth.context.user".into()]))
        );

        let keyed = AppDescriptor::new("auth")
            .context_processors_for("tera", ["auth.context.user"])
            .context_processors_for("tera", ["auth.context.perms"])
            .context_processors_for("minijinja", ["auth.context.user"]);
        let Some(ProcessorDecl::PerBackend(map)) = keyed.processors() else {
            panic!("expected per-backend declaration");
        };
        assert_eq!(
            map.get("tera"),
            Some(&vec![
                "auth.context.user".to_string(),
                "auth.context.perms".to_string()
            ])
        );
        assert_eq!(map.get("minijinja"), Some(&vec!["auth.context.user".to_string()]));
    }
}
