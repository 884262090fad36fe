//! Enum-like choices for model fields.
//!
//! A choice field stores a small integer and displays a label. The pieces
//! here keep the symbolic name, stored value, and label together so the
//! mapping is declared once: [`Choices`] for lists built at runtime, the
//! [`choices!`](crate::choices!) macro when a real enum is wanted.

use std::fmt;

/// An ordered, immutable set of `(name, value, label)` choices.
///
/// Names and values must be unique; construction panics otherwise, since a
/// duplicate is a programming error in the declaring code, not a runtime
/// condition.
///
/// ```
/// use settings_kit::Choices;
///
/// let status = Choices::new([
///     ("draft", 0, "Draft"),
///     ("published", 1, "Published"),
/// ]);
/// assert_eq!(status.label(1), Some("Published"));
/// assert_eq!(status.value("draft"), Some(0));
/// assert_eq!(status.choices(), vec![(0, "Draft"), (1, "Published")]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choices {
    choices: Vec<(String, i64, String)>,
}

impl Choices {
    pub fn new<N, L>(entries: impl IntoIterator<Item = (N, i64, L)>) -> Self
    where
        N: Into<String>,
        L: Into<String>,
    {
        let mut choices: Vec<(String, i64, String)> = Vec::new();
        for (name, value, label) in entries {
            let name = name.into();
            assert!(
                !choices.iter().any(|(n, _, _)| *n == name),
                "duplicate choice name: {name}"
            );
            assert!(
                !choices.iter().any(|(_, v, _)| *v == value),
                "duplicate choice value: {value}"
            );
            choices.push((name, value, label.into()));
        }
        Self { choices }
    }

    /// The display label stored under `value`.
    pub fn label(&self, value: i64) -> Option<&str> {
        self.choices
            .iter()
            .find(|(_, v, _)| *v == value)
            .map(|(_, _, label)| label.as_str())
    }

    /// The stored value of the choice named `name`.
    pub fn value(&self, name: &str) -> Option<i64> {
        self.choices
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, value, _)| *value)
    }

    /// The symbolic name of the choice stored as `value`.
    pub fn name(&self, value: i64) -> Option<&str> {
        self.choices
            .iter()
            .find(|(_, v, _)| *v == value)
            .map(|(name, _, _)| name.as_str())
    }

    /// `(value, label)` pairs, in declaration order, for a model field's
    /// allowed choices.
    pub fn choices(&self) -> Vec<(i64, &str)> {
        self.choices
            .iter()
            .map(|(_, value, label)| (*value, label.as_str()))
            .collect()
    }

    /// The symbolic names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.choices.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    pub fn contains_value(&self, value: i64) -> bool {
        self.choices.iter().any(|(_, v, _)| *v == value)
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Iterates the `(name, value, label)` triples in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64, &str)> {
        self.choices
            .iter()
            .map(|(name, value, label)| (name.as_str(), *value, label.as_str()))
    }
}

impl fmt::Display for Choices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value, _)) in self.choices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Declares an enum whose variants carry a stored value and a display label.
///
/// The generated enum gets `value()`, `label()`, `from_value()`, a static
/// `choices()` list, and a `Display` impl rendering the label. Use this over
/// [`Choices`] when the set is known at compile time and should participate
/// in `match`.
///
/// ```
/// use settings_kit::choices;
///
/// choices! {
///     pub enum ArticleStatus {
///         Draft = 0 => "Draft",
///         Published = 1 => "Published",
///         Archived = 2 => "Archived",
///     }
/// }
///
/// assert_eq!(ArticleStatus::Published.value(), 1);
/// assert_eq!(ArticleStatus::from_value(2), Some(ArticleStatus::Archived));
/// assert_eq!(ArticleStatus::choices()[0], (0, "Draft"));
/// assert_eq!(ArticleStatus::Draft.to_string(), "Draft");
/// ```
#[macro_export]
macro_rules! choices {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident = $value:expr => $label:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i64)]
        $vis enum $name {
            $($(#[$variant_meta])* $variant = $value),+
        }

        impl $name {
            /// The stored integer value of this choice.
            pub fn value(self) -> i64 {
                self as i64
            }

            /// The display label of this choice.
            pub fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Looks a choice up by its stored value.
            pub fn from_value(value: i64) -> Option<Self> {
                match value {
                    $(v if v == $value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// `(value, label)` pairs in declaration order.
            pub fn choices() -> Vec<(i64, &'static str)> {
                vec![$(($value, $label)),+]
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
