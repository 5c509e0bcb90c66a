//! Error type shared by the DownloaderApp tools
//!
//! Failures carry a stable code (`E2001`, `E8001`, ...) so scripts can react
//! to them, plus optional context and a hint for the person at the terminal.
//! `--json` output uses the [`ErrorReport`] form.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Stable codes grouped by the thousands digit
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Filesystem (2xxx)
    IoError = 2000,
    FileNotFound = 2001,
    PermissionDenied = 2002,

    // Configuration (3xxx)
    ConfigNotFound = 3001,
    ConfigParseError = 3002,
    ConfigValidationError = 3003,

    // Xcode project (8xxx)
    ProjectNotFound = 8001,
    InvalidProjectPath = 8002,
    InvalidAnchor = 8003,
}

impl ErrorCode {
    /// Numeric value, e.g. 8001
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Name of the code range
    pub fn category(&self) -> &'static str {
        match self {
            Self::IoError | Self::FileNotFound | Self::PermissionDenied => "IO",
            Self::ConfigNotFound | Self::ConfigParseError | Self::ConfigValidationError => {
                "Configuration"
            }
            Self::ProjectNotFound | Self::InvalidProjectPath | Self::InvalidAnchor => "Xcode",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Failure raised by the DownloaderApp tools
#[derive(Error, Debug)]
pub struct Error {
    /// Stable code
    pub code: ErrorCode,
    /// One-line description
    pub message: String,
    /// What was being attempted, e.g. "Reading project.pbxproj"
    pub context: Option<String>,
    /// Hint printed under the message
    pub suggestion: Option<String>,
    /// Underlying library error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  while: {}", ctx)?;
        }
        if let Some(hint) = &self.suggestion {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl Error {
    /// Error with a code and message only
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Attach what was being attempted
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach a hint for the user
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Keep the underlying error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Serializable form for `--json` output
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code,
            code_str: self.code.to_string(),
            category: self.code.category(),
            message: self.message.clone(),
            context: self.context.clone(),
            suggestion: self.suggestion.clone(),
            source: self.source.as_ref().map(|e| e.to_string()),
        }
    }

    /// An explicit config path that does not exist
    pub fn config_not_found(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Create a .downloader-tools.toml file or use --config to specify a path")
    }

    /// Configuration that parsed but does not validate
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigValidationError, message)
    }

    /// Missing project.pbxproj
    pub fn project_not_found(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("project.pbxproj not found at {}", path.as_ref().display()),
        )
        .with_suggestion("Run from the directory containing the .xcodeproj or pass --project")
    }

    /// A bundle path with no parent directory
    pub fn invalid_project_path(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::InvalidProjectPath,
            format!("Not an .xcodeproj bundle path: {}", path.as_ref().display()),
        )
    }
}

/// JSON shape of an [`Error`]
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub code_str: String,
    pub category: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Result alias over [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes of the `downloader-ios` binary
#[allow(missing_docs)]
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Project missing, unreadable or not writable
    pub const FAILURE: i32 = 1;
    /// Some insertion steps found no anchor
    pub const PARTIAL: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("TOML parse error: {}", err))
            .with_source(err)
    }
}

// Anchor patterns are built from configured ids and labels
impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::new(ErrorCode::InvalidAnchor, format!("Anchor pattern rejected: {}", err))
            .with_suggestion("Check the anchor ids and labels in the configuration")
            .with_source(err)
    }
}

/// Context helpers on [`Result`]
pub trait ResultExt<T> {
    /// Attach what was being attempted when the error occurred
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
