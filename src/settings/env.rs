use toml::{Table, Value};
use tracing::{debug, warn};

use super::source::{SettingsSource, SourceEntry};
use super::SettingsError;

/// A settings source that reads prefixed environment variables.
///
/// Variables are mapped to key paths by stripping `prefix` + `separator` and
/// splitting the rest on `separator`, lowercased: with prefix `"APP"` and
/// separator `"__"`, `APP__DATABASE__HOST` becomes `database.host`.
///
/// Values are parsed with TOML value syntax, so integers, floats, booleans,
/// quoted strings, arrays, and inline tables all come through typed; anything
/// that does not parse is kept as a plain string. A value that looks
/// structured (leading digit, quote, bracket, or brace) but fails to parse is
/// kept as a string and reported at `warn` level.
///
/// Variables the host consumes itself (such as the one naming the settings
/// file) can be excluded with [`ignore`](Self::ignore).
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    separator: String,
    ignored: Vec<String>,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        Self {
            prefix: prefix.into(),
            separator,
            ignored: Vec::new(),
        }
    }

    /// Excludes a variable by its full name (e.g. `APP__SETTINGS_FILE`).
    pub fn ignore(mut self, var: impl Into<String>) -> Self {
        self.ignored.push(var.into());
        self
    }
}

impl SettingsSource for EnvSource {
    fn entries(&self) -> Result<Vec<SourceEntry>, SettingsError> {
        let prefix_with_sep = format!("{}{}", self.prefix, self.separator);
        let mut entries = Vec::new();

        for (key, value) in std::env::vars() {
            if self.ignored.iter().any(|ignored| *ignored == key) {
                continue;
            }
            let Some(path_str) = key.strip_prefix(&prefix_with_sep) else {
                continue;
            };
            if path_str.is_empty() {
                continue;
            }

            let path: Vec<String> = path_str
                .split(&self.separator)
                .map(|s| s.to_lowercase())
                .collect();

            debug!("setting {} defined from environment variable {key}", path.join("."));
            entries.push(SourceEntry::at_path(path, coerce_value(&key, &value)));
        }

        Ok(entries)
    }
}

/// Parses an environment value with TOML value syntax, falling back to a
/// plain string.
fn coerce_value(name: &str, raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains('\n') {
        return Value::String(raw.to_string());
    }

    match format!("v = {trimmed}").parse::<Table>() {
        Ok(mut table) => match table.remove("v") {
            Some(value) => value,
            None => Value::String(raw.to_string()),
        },
        Err(_) => {
            if looks_structured(trimmed) {
                warn!(
                    "environment variable {name}='{raw}' looks structured but \
                     did not parse as a TOML value, kept as a string"
                );
            }
            Value::String(raw.to_string())
        }
    }
}

/// Mirrors the shapes a structured value can start with; used only to decide
/// whether a fallback to string deserves a warning.
fn looks_structured(s: &str) -> bool {
    s.starts_with(['"', '[', '{'])
        || s.starts_with(|c: char| c.is_ascii_digit())
        || s.starts_with("true")
        || s.starts_with("false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn entry_for<'a>(entries: &'a [SourceEntry], path: &[&str]) -> &'a Value {
        &entries
            .iter()
            .find(|e| e.path == path)
            .expect("entry should exist")
            .value
    }

    #[test]
    #[serial]
    fn test_prefix_and_path_mapping() {
        std::env::set_var("SKT_A__DATABASE__HOST", "localhost");
        std::env::set_var("SKT_A__DEBUG", "true");
        std::env::set_var("UNRELATED", "1");

        let entries = EnvSource::new("SKT_A", "__").entries().unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entry_for(&entries, &["database", "host"]).as_str(),
            Some("localhost")
        );
        assert_eq!(entry_for(&entries, &["debug"]).as_bool(), Some(true));

        std::env::remove_var("SKT_A__DATABASE__HOST");
        std::env::remove_var("SKT_A__DEBUG");
        std::env::remove_var("UNRELATED");
    }

    #[test]
    #[serial]
    fn test_structured_value_coercion() {
        std::env::set_var("SKT_B__PORT", "8080");
        std::env::set_var("SKT_B__RATIO", "0.5");
        std::env::set_var("SKT_B__HOSTS", "[\"a\", \"b\"]");
        std::env::set_var("SKT_B__QUOTED", "\"8080\"");
        std::env::set_var("SKT_B__NAME", "plain text");

        let entries = EnvSource::new("SKT_B", "__").entries().unwrap();

        assert_eq!(entry_for(&entries, &["port"]).as_integer(), Some(8080));
        assert_eq!(entry_for(&entries, &["ratio"]).as_float(), Some(0.5));
        let hosts = entry_for(&entries, &["hosts"]).as_array().unwrap();
        assert_eq!(hosts[1].as_str(), Some("b"));
        // Quoting forces string, exactly like a TOML file would.
        assert_eq!(entry_for(&entries, &["quoted"]).as_str(), Some("8080"));
        assert_eq!(entry_for(&entries, &["name"]).as_str(), Some("plain text"));

        for var in [
            "SKT_B__PORT",
            "SKT_B__RATIO",
            "SKT_B__HOSTS",
            "SKT_B__QUOTED",
            "SKT_B__NAME",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_structured_looking_garbage_falls_back_to_string() {
        std::env::set_var("SKT_C__ADDR", "127.0.0.1");

        let entries = EnvSource::new("SKT_C", "__").entries().unwrap();
        assert_eq!(entry_for(&entries, &["addr"]).as_str(), Some("127.0.0.1"));

        std::env::remove_var("SKT_C__ADDR");
    }

    #[test]
    #[serial]
    fn test_ignored_variable_is_skipped() {
        std::env::set_var("SKT_D__SETTINGS_FILE", "conf/site.toml");
        std::env::set_var("SKT_D__KEPT", "1");

        let entries = EnvSource::new("SKT_D", "__")
            .ignore("SKT_D__SETTINGS_FILE")
            .entries()
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, ["kept"]);

        std::env::remove_var("SKT_D__SETTINGS_FILE");
        std::env::remove_var("SKT_D__KEPT");
    }

    #[test]
    #[serial]
    fn test_bare_prefix_is_skipped() {
        std::env::set_var("SKT_E__", "x");

        let entries = EnvSource::new("SKT_E", "__").entries().unwrap();
        assert!(entries.is_empty());

        std::env::remove_var("SKT_E__");
    }

    #[test]
    #[should_panic(expected = "separator must not be empty")]
    fn test_empty_separator_panics() {
        let _ = EnvSource::new("SKT", "");
    }
}
