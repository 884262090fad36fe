//! Template backend fixes: context processors and loader caching.
//!
//! The `templates` setting is an array of backend configurations:
//!
//! ```toml
//! [[templates]]
//! backend = "tera"
//! app_dirs = true
//!
//! [templates.options]
//! context_processors = ["site.context.defaults"]
//! ```
//!
//! The helpers here rewrite those entries at load time: installed apps get
//! their declared context processors appended, and production runs get the
//! loader list wrapped in the caching loader.

use std::collections::{BTreeMap, HashSet};

use toml::{Table, Value};
use tracing::debug;

use crate::apps::{AppDescriptor, AppRegistry, ProcessorDecl};
use crate::settings::{keys, Settings, SettingsError};

/// Backend identifier assumed when an app declares processors without one.
pub const DEFAULT_TEMPLATE_BACKEND: &str = "tera";
/// Loader reading templates from the configured directories.
pub const DEFAULT_LOADER: &str = "filesystem";
/// Loader reading templates from installed apps' template directories.
pub const APP_DIRS_LOADER: &str = "app_dirs";
/// Loader wrapping others with a compiled-template cache.
pub const CACHED_LOADER: &str = "cached";

/// Appends the installed apps' context processors to the template
/// configuration.
///
/// Apps are walked in `installed_apps` order; each app's declared processors
/// are appended to `options.context_processors` of the backend they name
/// (plain declarations go to the default backend). Processors already
/// configured stay in front, and duplicates keep their first occurrence.
/// Backends without a `templates` entry are ignored, and a missing
/// `installed_apps` or `templates` setting makes this a no-op.
pub fn add_context_processors(
    settings: &mut Settings,
    registry: &AppRegistry,
) -> Result<(), SettingsError> {
    let Some(installed) = settings.get_string_array(keys::INSTALLED_APPS)? else {
        return Ok(());
    };

    let mut collected: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for app_name in &installed {
        let Some(decl) = registry.get(app_name).and_then(AppDescriptor::processors) else {
            continue;
        };
        match decl {
            ProcessorDecl::Default(list) => collected
                .entry(DEFAULT_TEMPLATE_BACKEND.to_string())
                .or_default()
                .extend(list.iter().cloned()),
            ProcessorDecl::PerBackend(map) => {
                for (backend, list) in map {
                    collected
                        .entry(backend.clone())
                        .or_default()
                        .extend(list.iter().cloned());
                }
            }
        }
    }
    if collected.is_empty() {
        return Ok(());
    }

    let Some(entries) = template_entries_mut(settings)? else {
        return Ok(());
    };
    for entry in entries {
        let table = entry_table_mut(entry)?;
        let backend = match table.get("backend").and_then(Value::as_str) {
            Some(backend) => backend.to_string(),
            None => continue,
        };
        let Some(new_processors) = collected.get(&backend) else {
            continue;
        };

        let options = options_table_mut(table)?;
        let processors = options
            .entry("context_processors")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(processors) = processors.as_array_mut() else {
            return Err(mismatch(
                "templates.options.context_processors",
                "array of strings",
            ));
        };

        let mut combined = Vec::with_capacity(processors.len() + new_processors.len());
        for value in processors.iter() {
            let existing = value.as_str().ok_or_else(|| {
                mismatch("templates.options.context_processors", "array of strings")
            })?;
            combined.push(existing.to_string());
        }
        combined.extend(new_processors.iter().cloned());

        *processors = dedup_in_order(combined)
            .into_iter()
            .map(Value::String)
            .collect();
    }
    Ok(())
}

/// Wraps template loaders in the caching loader for production runs.
///
/// A no-op while `debug` is true: templates should recompile on every
/// request during development. Otherwise, every `templates` entry whose
/// backend is listed in `cached_backends` gets its loaders wrapped as
/// `[["cached", [...]]]`. A missing or empty loader list is synthesized
/// first (the filesystem loader, plus the app-dirs loader when `app_dirs`
/// is set), and
/// configurations already containing the cached loader anywhere in their
/// nesting are left untouched.
pub fn cache_template_loaders(
    settings: &mut Settings,
    cached_backends: &[&str],
) -> Result<(), SettingsError> {
    if settings.get_bool(keys::DEBUG).unwrap_or(false) {
        return Ok(());
    }
    let Some(entries) = template_entries_mut(settings)? else {
        return Ok(());
    };

    for entry in entries {
        let table = entry_table_mut(entry)?;
        let backend = match table.get("backend").and_then(Value::as_str) {
            Some(backend) if cached_backends.contains(&backend) => backend.to_string(),
            _ => continue,
        };
        let app_dirs = table
            .get("app_dirs")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let options = options_table_mut(table)?;
        let inner = match options.get("loaders") {
            Some(Value::Array(loaders)) if !loaders.is_empty() => {
                if loader_names(loaders).contains(&CACHED_LOADER) {
                    continue;
                }
                loaders.clone()
            }
            // An empty list counts as unconfigured, same as a missing key.
            Some(Value::Array(_)) | None => {
                let mut defaults = vec![Value::String(DEFAULT_LOADER.to_string())];
                if app_dirs {
                    defaults.push(Value::String(APP_DIRS_LOADER.to_string()));
                }
                defaults
            }
            Some(_) => return Err(mismatch("templates.options.loaders", "array")),
        };

        options.insert(
            "loaders".to_string(),
            Value::Array(vec![Value::Array(vec![
                Value::String(CACHED_LOADER.to_string()),
                Value::Array(inner),
            ])]),
        );
        // Backends reject app_dirs combined with an explicit loader list.
        table.remove("app_dirs");
        debug!("template loader caching enabled for backend {backend}");
    }
    Ok(())
}

fn template_entries_mut(
    settings: &mut Settings,
) -> Result<Option<&mut Vec<Value>>, SettingsError> {
    let Some(value) = settings.as_table_mut().get_mut(keys::TEMPLATES) else {
        return Ok(None);
    };
    match value.as_array_mut() {
        Some(entries) => Ok(Some(entries)),
        None => Err(mismatch(keys::TEMPLATES, "array of tables")),
    }
}

fn entry_table_mut(entry: &mut Value) -> Result<&mut Table, SettingsError> {
    entry
        .as_table_mut()
        .ok_or_else(|| mismatch(keys::TEMPLATES, "array of tables"))
}

fn options_table_mut(table: &mut Table) -> Result<&mut Table, SettingsError> {
    table
        .entry("options")
        .or_insert_with(|| Value::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| mismatch("templates.options", "table"))
}

fn mismatch(key: &str, expected: &'static str) -> SettingsError {
    SettingsError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

/// String leaves of a loader list, through any level of nesting.
fn loader_names(values: &[Value]) -> Vec<&str> {
    let mut names = Vec::new();
    collect_loader_names(values, &mut names);
    names
}

fn collect_loader_names<'a>(values: &'a [Value], out: &mut Vec<&'a str>) {
    for value in values {
        match value {
            Value::String(name) => out.push(name),
            Value::Array(nested) => collect_loader_names(nested, out),
            _ => {}
        }
    }
}

fn dedup_in_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
