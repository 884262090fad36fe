//! One-shot deprecation warnings.
//!
//! A deprecated API should tell its callers where to go, but telling them on
//! every call floods the log. [`warn_deprecated`] keeps a process-wide record
//! of what has already been announced and warns exactly once per subject.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::warn;

static SEEN: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Warns that `subject` is deprecated, once per process.
///
/// The first call for a given subject emits a `warn!` carrying the migration
/// note; repeat calls are silent. Returns whether this call emitted.
pub fn warn_deprecated(subject: &str, note: &str) -> bool {
    let seen = SEEN.get_or_init(|| Mutex::new(HashSet::new()));
    let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
    if !seen.insert(subject.to_string()) {
        return false;
    }
    warn!("{subject} is deprecated: {note}");
    true
}

/// Announces a deprecated API at its definition site.
///
/// Expands to [`warn_deprecated`](crate::deprecation::warn_deprecated) with
/// the subject prefixed by [`module_path!`], so the same name in two modules
/// deduplicates separately.
///
/// ```
/// use settings_kit::deprecated;
///
/// fn legacy_helper() {
///     deprecated!("legacy_helper", "use the settings builder instead");
/// }
///
/// legacy_helper();
/// legacy_helper(); // silent
/// ```
#[macro_export]
macro_rules! deprecated {
    ($subject:expr, $note:expr $(,)?) => {
        $crate::deprecation::warn_deprecated(
            &format!("{}::{}", module_path!(), $subject),
            $note,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Subjects are process-global state, so every test uses its own.

    #[test]
    fn test_first_call_emits_then_goes_silent() {
        assert!(warn_deprecated("old_loader", "use the builder"));
        assert!(!warn_deprecated("old_loader", "use the builder"));
        assert!(!warn_deprecated("old_loader", "a different note"));
    }

    #[test]
    fn test_subjects_tracked_independently() {
        assert!(warn_deprecated("old_reader", "gone in 0.2"));
        assert!(warn_deprecated("old_writer", "gone in 0.2"));
    }

    #[test]
    fn test_macro_keys_by_module_path() {
        assert!(deprecated!("shared_name", "note"));
        assert!(!deprecated!("shared_name", "note"));
        // The bare subject was never announced; only the module-prefixed one.
        assert!(warn_deprecated("shared_name", "note"));
    }
}
