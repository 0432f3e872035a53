//! Error types for the configuration layer
//!
//! - Parse failures (text → [`Document`](crate::Document))
//! - File access while reading or writing a configuration
//! - Layout problems while generating a configuration from a template

use std::path::PathBuf;

/// Errors raised while reading, parsing or writing a configuration document
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The text violates the block/line structure
    ///
    /// `block` is the zero-based index of the offending block chunk.
    #[error("malformed config (block {block}): {message}")]
    Malformed { block: usize, message: String },

    /// IO error on a configuration file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create malformed-config error for a block chunk
    pub fn malformed(block: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            block,
            message: message.into(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while turning a TOML layout into a document
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The layout is not valid TOML or does not match the layout schema
    #[error("invalid layout: {0}")]
    Layout(#[from] toml::de::Error),

    /// A setting has a TOML type that has no configuration equivalent
    #[error("unsupported value for '{key}' in {block}: {found}")]
    UnsupportedValue {
        block: String,
        key: String,
        found: String,
    },

    /// The generated document is inconsistent
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
