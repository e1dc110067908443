//! Error types for the schema compiler
//!
//! Every compile error is structural: the run aborts and no partial output is
//! produced. Variants carry the schema name and a field path so a failure can
//! be located without a debugger.

use thiserror::Error;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Schema compiler errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unresolved reference to '{missing}' from {schema} at {path}")]
    Resolution {
        missing: String,
        schema: String,
        path: String,
    },

    #[error("unsupported schema in {schema} at {path}: {reason}")]
    UnsupportedSchema {
        schema: String,
        path: String,
        reason: String,
    },

    #[error("recursion limit of {limit} exceeded in {schema} at {path}")]
    RecursionLimitExceeded {
        schema: String,
        path: String,
        limit: usize,
    },

    #[error("invalid document at {path}: {message}")]
    InvalidDocument { path: String, message: String },

    #[error(
        "path parameters of {method} {path} do not match its placeholders \
         (undeclared placeholders: [{}], parameters without placeholder: [{}])",
        undeclared.join(", "),
        unused.join(", ")
    )]
    RouteParameterMismatch {
        path: String,
        method: String,
        undeclared: Vec<String>,
        unused: Vec<String>,
    },

    #[error("invalid pre-registration '{name}': {message}")]
    InvalidPreRegistration { name: String, message: String },
}

impl CompileError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }

    pub(crate) fn unsupported(schema: &str, path: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedSchema {
            schema: schema.to_string(),
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_document(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Errors while loading compiler configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 3,
            _ => 2,
        }
    }
}
