//! Engine error type and the stable error-code taxonomy shared by the library,
//! the CLI exit codes and the stdio service.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Stable, wire-visible error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A path lies outside every configured project root.
    #[serde(rename = "E_ACCESS_DENIED")]
    AccessDenied,
    /// The requested resource already exists.
    #[serde(rename = "E_CONFLICT")]
    Conflict,
    /// An engine-level deadline elapsed.
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    /// Filesystem or process I/O failed.
    #[serde(rename = "E_IO")]
    Io,
    /// Malformed request on the stdio service.
    #[serde(rename = "E_PROTOCOL")]
    Protocol,
    /// A caller-supplied value is unusable.
    #[serde(rename = "E_INVALID_ARGUMENT")]
    InvalidArgument,
    /// Settings could not be loaded, validated or saved.
    #[serde(rename = "E_CONFIG")]
    Config,
    /// The referenced file, directory or project does not exist.
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    /// Invariant violation inside the engine.
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    /// Every code, in exit-code order.
    pub const ALL: [Self; 9] = [
        Self::AccessDenied,
        Self::Conflict,
        Self::Timeout,
        Self::Io,
        Self::Protocol,
        Self::InvalidArgument,
        Self::Config,
        Self::NotFound,
        Self::Internal,
    ];

    /// Wire representation, e.g. `E_ACCESS_DENIED`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "E_ACCESS_DENIED",
            Self::Conflict => "E_CONFLICT",
            Self::Timeout => "E_TIMEOUT",
            Self::Io => "E_IO",
            Self::Protocol => "E_PROTOCOL",
            Self::InvalidArgument => "E_INVALID_ARGUMENT",
            Self::Config => "E_CONFIG",
            Self::NotFound => "E_NOT_FOUND",
            Self::Internal => "E_INTERNAL",
        }
    }

    /// Parse a wire code back into an [`ErrorCode`].
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Process exit code the CLI uses for this error.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::AccessDenied => 2,
            Self::Conflict => 3,
            Self::Timeout => 4,
            Self::Io => 5,
            Self::Protocol => 6,
            Self::InvalidArgument => 7,
            Self::Config => 8,
            Self::NotFound => 9,
            Self::Internal => 10,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable projection of an [`EngineError`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Error raised by engine operations.
///
/// Only rejections (access denied, conflicts, bad input, I/O on the engine's own
/// files) are errors. Process failures are reported through
/// [`crate::ExecutionResult`] instead.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<Value>,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::AccessDenied, message, context)
    }

    pub fn conflict(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Conflict, message, context)
    }

    pub fn invalid_argument(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message, context)
    }

    pub fn not_found(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::NotFound, message, context)
    }

    pub fn config(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Config, message, context)
    }

    pub fn protocol(message: impl Into<String>, context: impl Into<Option<Value>>) -> Self {
        Self::new(ErrorCode::Protocol, message, context)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message, None)
    }

    /// I/O failure on `path`; the source error text lands in the context.
    pub fn io(
        message: impl Into<String>,
        path: impl AsRef<std::path::Path>,
        err: impl fmt::Display,
    ) -> Self {
        Self::new(
            ErrorCode::Io,
            message,
            serde_json::json!({
                "path": path.as_ref().display().to_string(),
                "source": err.to_string(),
            }),
        )
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl Diagnostic for EngineError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let fix = self.context.as_ref()?.get("fix")?.as_str()?;
        Some(Box::new(fix.to_string()))
    }
}
