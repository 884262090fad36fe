use toml::{Table, Value};

use super::SettingsError;

/// A single value contributed by a [`SettingsSource`], addressed by key path.
///
/// An empty path means the value is a whole table to merge at the root.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub path: Vec<String>,
    pub value: Value,
}

impl SourceEntry {
    /// Entry merging an entire table at the root of the settings.
    pub fn root(table: Table) -> Self {
        Self {
            path: Vec::new(),
            value: Value::Table(table),
        }
    }

    /// Entry merging a single value at a nested key path.
    pub fn at_path(path: Vec<String>, value: Value) -> Self {
        Self { path, value }
    }
}

/// Anything that can contribute settings to the loading pipeline.
///
/// Built-in implementations cover TOML files ([`FileSource`](super::FileSource))
/// and prefixed environment variables ([`EnvSource`](super::EnvSource)); hosts
/// with bespoke sources implement this and register them with
/// [`SettingsBuilder::with_source`](super::SettingsBuilder::with_source).
pub trait SettingsSource: Send + Sync + std::fmt::Debug {
    fn entries(&self) -> Result<Vec<SourceEntry>, SettingsError>;
}

/// Merges `value` into `table` at the given key path, creating intermediate
/// tables as needed. Tables merge recursively; any other value replaces what
/// was there before.
pub fn merge_at_path(table: &mut Table, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        if let Value::Table(overlay) = value {
            deep_merge(table, overlay);
        }
        return;
    };

    if rest.is_empty() {
        match (table.get_mut(first), value) {
            (Some(Value::Table(base)), Value::Table(overlay)) => {
                deep_merge(base, overlay);
            }
            (_, value) => {
                table.insert(first.clone(), value);
            }
        }
        return;
    }

    if !matches!(table.get(first), Some(Value::Table(_))) {
        table.insert(first.clone(), Value::Table(Table::new()));
    }

    if let Some(Value::Table(nested)) = table.get_mut(first) {
        merge_at_path(nested, rest, value);
    }
}

/// Deep merge: tables merge key by key, everything else (arrays included) is
/// replaced by the overlay.
pub fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(base_table)), Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &str) -> Table {
        s.parse().unwrap()
    }

    #[test]
    fn test_deep_merge_scalars_override() {
        let mut base = table("timeout = 100");
        deep_merge(&mut base, table("timeout = 200"));
        assert_eq!(base["timeout"].as_integer(), Some(200));
    }

    #[test]
    fn test_deep_merge_tables_recurse() {
        let mut base = table("[db]\nhost = \"a\"\nport = 5432");
        deep_merge(&mut base, table("[db]\nhost = \"b\""));
        assert_eq!(base["db"]["host"].as_str(), Some("b"));
        assert_eq!(base["db"]["port"].as_integer(), Some(5432));
    }

    #[test]
    fn test_deep_merge_arrays_replace() {
        let mut base = table("apps = [\"a\", \"b\", \"c\"]");
        deep_merge(&mut base, table("apps = [\"x\"]"));
        let apps = base["apps"].as_array().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].as_str(), Some("x"));
    }

    #[test]
    fn test_merge_at_root() {
        let mut base = table("a = 1");
        merge_at_path(&mut base, &[], Value::Table(table("b = 2")));
        assert_eq!(base["a"].as_integer(), Some(1));
        assert_eq!(base["b"].as_integer(), Some(2));
    }

    #[test]
    fn test_merge_at_nested_path_creates_tables() {
        let mut base = Table::new();
        let path = vec!["db".to_string(), "host".to_string()];
        merge_at_path(&mut base, &path, Value::String("localhost".into()));
        assert_eq!(base["db"]["host"].as_str(), Some("localhost"));
    }

    #[test]
    fn test_merge_at_path_replaces_non_table_intermediate() {
        let mut base = table("db = 7");
        let path = vec!["db".to_string(), "host".to_string()];
        merge_at_path(&mut base, &path, Value::String("localhost".into()));
        assert_eq!(base["db"]["host"].as_str(), Some("localhost"));
    }

    #[test]
    fn test_merge_at_path_merges_leaf_tables() {
        let mut base = table("[db]\nhost = \"a\"");
        let path = vec!["db".to_string()];
        merge_at_path(&mut base, &path, Value::Table(table("port = 1")));
        assert_eq!(base["db"]["host"].as_str(), Some("a"));
        assert_eq!(base["db"]["port"].as_integer(), Some(1));
    }
}
