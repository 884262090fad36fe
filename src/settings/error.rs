use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("required settings file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read settings file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to deserialize settings: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("circular reference detected in settings")]
    CircularReference,

    #[error("referenced setting not found: {0}")]
    ReferenceNotFound(String),

    #[error("invalid reference path: {0}")]
    InvalidReferencePath(String),

    #[error("cannot reference non-scalar setting: {0}")]
    NonScalarReference(String),

    #[error("unclosed reference (missing '}}')")]
    UnclosedReference,

    #[error("secret key file '{path}': {source}")]
    SecretKeyIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("setting '{key}' has an unexpected shape (expected {expected})")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("invalid style '{value}' for '{key}': {source}")]
    InvalidStyle {
        key: String,
        value: String,
        source: crate::logging::ParseStyleError,
    },
}
