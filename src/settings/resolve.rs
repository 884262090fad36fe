//! Reference expansion for settings values.
//!
//! String values may refer to other settings with `${path.to.setting}`, so an
//! override can be assembled from values merged before it. `$$` escapes a
//! literal `$`.

use toml::{Table, Value};

use super::SettingsError;

const MAX_PASSES: usize = 100;

/// Expands every `${...}` reference in the table, pass by pass, until a pass
/// makes no substitution.
///
/// Chained references settle after a few passes; references that can never
/// settle (a cycle) hit the pass limit and fail with `CircularReference`.
/// A reference to a missing path or to a non-scalar value is an error.
pub fn resolve_references(table: &mut Table) -> Result<(), SettingsError> {
    for _ in 0..MAX_PASSES {
        let resolver = Resolver {
            root: table.clone(),
        };
        if resolver.pass(table)? == 0 {
            return Ok(());
        }
    }
    Err(SettingsError::CircularReference)
}

/// One expansion pass, looking values up in a snapshot of the table so the
/// outcome does not depend on key iteration order.
struct Resolver {
    root: Table,
}

impl Resolver {
    fn pass(&self, table: &mut Table) -> Result<usize, SettingsError> {
        let mut substitutions = 0;
        for (_key, value) in table.iter_mut() {
            substitutions += self.expand_value(value)?;
        }
        Ok(substitutions)
    }

    fn expand_value(&self, value: &mut Value) -> Result<usize, SettingsError> {
        match value {
            Value::String(s) => {
                let (expanded, count) = self.expand_str(s)?;
                *s = expanded;
                Ok(count)
            }
            Value::Table(nested) => self.pass(nested),
            Value::Array(items) => {
                let mut substitutions = 0;
                for item in items.iter_mut() {
                    substitutions += self.expand_value(item)?;
                }
                Ok(substitutions)
            }
            _ => Ok(0),
        }
    }

    /// Returns the expanded string and how many references it replaced.
    fn expand_str(&self, input: &str) -> Result<(String, usize), SettingsError> {
        let mut out = String::with_capacity(input.len());
        let mut substitutions = 0;
        let mut chars = input.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '$' {
                out.push(ch);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut path = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        path.push(c);
                    }
                    if !closed {
                        return Err(SettingsError::UnclosedReference);
                    }
                    out.push_str(&self.lookup(&path)?);
                    substitutions += 1;
                }
                // A lone `$` is kept as-is.
                _ => out.push('$'),
            }
        }

        Ok((out, substitutions))
    }

    /// Looks up a dotted path in the snapshot and renders it as a string.
    fn lookup(&self, path: &str) -> Result<String, SettingsError> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(SettingsError::InvalidReferencePath(path.to_string()));
        }

        let missing = || SettingsError::ReferenceNotFound(path.to_string());
        let (first, rest) = parts.split_first().ok_or_else(missing)?;
        let mut value = self.root.get(*first).ok_or_else(missing)?;
        for part in rest {
            value = value
                .as_table()
                .and_then(|t| t.get(*part))
                .ok_or_else(missing)?;
        }

        scalar_to_string(value, path)
    }
}

fn scalar_to_string(value: &Value, path: &str) -> Result<String, SettingsError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Datetime(dt) => Ok(dt.to_string()),
        Value::Array(_) | Value::Table(_) => {
            Err(SettingsError::NonScalarReference(path.to_string()))
        }
    }
}
