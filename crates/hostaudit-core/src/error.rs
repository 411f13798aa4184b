//! Error types for hostaudit

use crate::outcome::ErrorKind;
use thiserror::Error;

/// Result type alias using hostaudit Error
pub type Result<T> = std::result::Result<T, Error>;

/// hostaudit error types
#[derive(Error, Debug)]
pub enum Error {
    // === File Access Errors ===
    #[error("Symlink not allowed: {path}")]
    SymlinkRejected { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("File too large: {path} ({size} bytes, limit {limit})")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("Not a regular file: {path}")]
    NotRegularFile { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Parse Errors ===
    #[error("Parse error in {path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Include depth exceeded at {path} (limit {limit})")]
    IncludeDepthExceeded { path: String, limit: usize },

    #[error("Invalid pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Rule Errors ===
    #[error("Invalid rule {rule_id}: missing {field}")]
    MissingField { rule_id: String, field: String },

    #[error("Invalid rule {rule_id}: {field} has unsupported value '{value}'")]
    InvalidFieldValue {
        rule_id: String,
        field: String,
        value: String,
    },

    #[error("Unknown rule kind: {kind}")]
    UnknownKind { kind: String },

    // === Command Errors ===
    #[error("Command not allowed: {command}")]
    CommandNotAllowed { command: String },

    #[error("Command not found: {command}")]
    CommandNotFound { command: String },

    #[error("Command timeout ({seconds}s): {command}")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a parse error for a file/line location
    pub fn parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Check if this error is fatal (should stop the audit run)
    ///
    /// Nothing raised while evaluating a single rule is fatal; only a broken
    /// configuration stops a run before it starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::InvalidConfig { .. }
        )
    }

    /// Check if this error came from the filesystem rather than the rule itself
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            Error::SymlinkRejected { .. }
                | Error::FileNotFound { .. }
                | Error::FileTooLarge { .. }
                | Error::NotRegularFile { .. }
                | Error::Io(_)
        )
    }

    /// Map onto the labeled error reason carried by outcomes
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SymlinkRejected { .. } => ErrorKind::Symlink,
            Error::FileNotFound { .. } | Error::NotRegularFile { .. } | Error::Io(_) => {
                ErrorKind::Io
            }
            Error::FileTooLarge { .. } => ErrorKind::Limit,
            Error::Parse { .. }
            | Error::IncludeDepthExceeded { .. }
            | Error::InvalidPattern { .. }
            | Error::Json(_) => ErrorKind::Parse,
            Error::MissingField { .. }
            | Error::InvalidFieldValue { .. }
            | Error::UnknownKind { .. } => ErrorKind::Validation,
            Error::CommandNotAllowed { .. } => ErrorKind::CommandNotAllowed,
            Error::CommandTimeout { .. } => ErrorKind::Timeout,
            Error::CommandNotFound { .. } | Error::CommandFailed { .. } => ErrorKind::Command,
            Error::Configuration(_) | Error::InvalidConfig { .. } | Error::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Error::SymlinkRejected { .. } => "SYMLINK_REJECTED",
            Error::FileNotFound { .. } => "FILE_NOT_FOUND",
            Error::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Error::NotRegularFile { .. } => "NOT_REGULAR_FILE",
            Error::Io(_) => "IO_ERROR",
            Error::Parse { .. } => "PARSE_ERROR",
            Error::IncludeDepthExceeded { .. } => "INCLUDE_DEPTH",
            Error::InvalidPattern { .. } => "INVALID_PATTERN",
            Error::Json(_) => "JSON_ERROR",
            Error::MissingField { .. } => "MISSING_FIELD",
            Error::InvalidFieldValue { .. } => "INVALID_FIELD",
            Error::UnknownKind { .. } => "UNKNOWN_KIND",
            Error::CommandNotAllowed { .. } => "COMMAND_NOT_ALLOWED",
            Error::CommandNotFound { .. } => "COMMAND_NOT_FOUND",
            Error::CommandTimeout { .. } => "COMMAND_TIMEOUT",
            Error::CommandFailed { .. } => "COMMAND_FAILED",
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::InvalidConfig { .. } => "INVALID_CONFIG",
            Error::Other(_) => "OTHER",
        }
    }
}
