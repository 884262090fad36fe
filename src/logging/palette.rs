use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::settings::{keys, Settings, SettingsError};

/// A terminal foreground color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl Color {
    fn fg_code(self) -> u8 {
        match self {
            Color::Black => 30,
            Color::Red => 31,
            Color::Green => 32,
            Color::Yellow => 33,
            Color::Blue => 34,
            Color::Magenta => 35,
            Color::Cyan => 36,
            Color::White => 37,
            Color::BrightBlack => 90,
            Color::BrightRed => 91,
            Color::BrightGreen => 92,
            Color::BrightYellow => 93,
            Color::BrightBlue => 94,
            Color::BrightMagenta => 95,
            Color::BrightCyan => 96,
            Color::BrightWhite => 97,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "black" => Color::Black,
            "red" => Color::Red,
            "green" => Color::Green,
            "yellow" => Color::Yellow,
            "blue" => Color::Blue,
            "magenta" => Color::Magenta,
            "cyan" => Color::Cyan,
            "white" => Color::White,
            "bright_black" => Color::BrightBlack,
            "bright_red" => Color::BrightRed,
            "bright_green" => Color::BrightGreen,
            "bright_yellow" => Color::BrightYellow,
            "bright_blue" => Color::BrightBlue,
            "bright_magenta" => Color::BrightMagenta,
            "bright_cyan" => Color::BrightCyan,
            "bright_white" => Color::BrightWhite,
            _ => return None,
        })
    }
}

/// A style token wasn't a known color or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized style token: {0}")]
pub struct ParseStyleError(pub String);

/// How a piece of log output is rendered.
///
/// Parsed from whitespace-separated tokens: a color name (`"magenta"`,
/// `"bright_blue"`) and/or the attributes `bold`, `dim`, and `underline`.
///
/// ```
/// use settings_kit::Style;
///
/// let style: Style = "bold magenta".parse()?;
/// assert_eq!(style.paint("hello"), "\x1b[1;35mhello\x1b[0m");
/// # Ok::<(), settings_kit::logging::ParseStyleError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Style {
    color: Option<Color>,
    bold: bool,
    dim: bool,
    underline: bool,
}

impl Style {
    /// A style that renders text unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fg(color: Color) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn dim(mut self) -> Self {
        self.dim = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    /// Whether painting with this style is a no-op.
    pub fn is_plain(&self) -> bool {
        self.color.is_none() && !self.bold && !self.dim && !self.underline
    }

    /// Wraps `text` in the escape sequence for this style.
    ///
    /// Plain styles return the text unchanged, so painted output never
    /// carries an empty escape sequence.
    pub fn paint(&self, text: &str) -> String {
        if self.is_plain() {
            return text.to_string();
        }
        let mut codes: Vec<String> = Vec::new();
        if self.bold {
            codes.push("1".to_string());
        }
        if self.dim {
            codes.push("2".to_string());
        }
        if self.underline {
            codes.push("4".to_string());
        }
        if let Some(color) = self.color {
            codes.push(color.fg_code().to_string());
        }
        format!("\x1b[{}m{text}\x1b[0m", codes.join(";"))
    }
}

impl FromStr for Style {
    type Err = ParseStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut style = Style::new();
        for token in s.split_whitespace() {
            match token {
                "bold" => style.bold = true,
                "dim" => style.dim = true,
                "underline" => style.underline = true,
                name => match Color::from_name(name) {
                    Some(color) => style.color = Some(color),
                    None => return Err(ParseStyleError(token.to_string())),
                },
            }
        }
        Ok(style)
    }
}

impl TryFrom<String> for Style {
    type Error = ParseStyleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Ordered prefix rules mapping event targets to styles.
///
/// Built in code or read from the `[logging.colors]` settings table, where
/// each key is a target prefix and each value a style string:
///
/// ```toml
/// [logging.colors]
/// sqlx = "magenta"
/// tower_http = "dim"
/// app = "bold bright_green"
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    rules: Vec<(String, Style)>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule. A later rule for the same prefix replaces the earlier
    /// one when matching.
    pub fn rule(mut self, prefix: impl Into<String>, style: Style) -> Self {
        self.rules.push((prefix.into(), style));
        self
    }

    /// The style of the rule with the longest prefix matching `target`.
    pub fn style_for(&self, target: &str) -> Option<&Style> {
        self.rules
            .iter()
            .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, style)| style)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Reads the palette from the `logging.colors` settings table.
    ///
    /// An absent table yields an empty palette. A table of the wrong shape
    /// or an unparseable style string is an error.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let colors_key = format!("{}.colors", keys::LOGGING);
        let Some(value) = settings.get_path(&colors_key) else {
            return Ok(Self::new());
        };
        let table = value.as_table().ok_or_else(|| SettingsError::TypeMismatch {
            key: colors_key.clone(),
            expected: "table of style strings",
        })?;

        let mut palette = Self::new();
        for (prefix, style) in table {
            let style = style.as_str().ok_or_else(|| SettingsError::TypeMismatch {
                key: format!("{colors_key}.{prefix}"),
                expected: "style string",
            })?;
            let style = style.parse().map_err(|source| SettingsError::InvalidStyle {
                key: format!("{colors_key}.{prefix}"),
                value: style.to_string(),
                source,
            })?;
            palette = palette.rule(prefix.as_str(), style);
        }
        Ok(palette)
    }
}
