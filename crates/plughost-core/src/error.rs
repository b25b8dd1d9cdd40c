//! Unified error types for plughost.
//!
//! All runtime components map their internal errors into [`AppError`] for
//! consistent propagation through the ? operator. Hook-level failures are
//! not represented here; they are contained in dispatch results.

use std::fmt;
use thiserror::Error;

/// Error kind categorization used across the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested plugin, command, or hook was not found.
    NotFound,
    /// A hook, command, plugin manifest, or option set was malformed.
    Validation,
    /// The operation conflicts with current state (duplicate owner, cycle, etc.).
    Conflict,
    /// The plugin manager has not been initialized yet.
    NotInitialized,
    /// A service key was resolved without a registration.
    ServiceNotRegistered,
    /// A plugin attempted an operation it has no permission for.
    PermissionDenied,
    /// A plugin lifecycle callback failed.
    Lifecycle,
    /// Package acquisition or removal failed.
    Installation,
    /// A command or hook handler failed.
    HookExecution,
    /// An operation exceeded its time budget.
    Timeout,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::NotInitialized => write!(f, "NOT_INITIALIZED"),
            Self::ServiceNotRegistered => write!(f, "SERVICE_NOT_REGISTERED"),
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::Lifecycle => write!(f, "LIFECYCLE"),
            Self::Installation => write!(f, "INSTALLATION"),
            Self::HookExecution => write!(f, "HOOK_EXECUTION"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout plughost.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a not-initialized error.
    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotInitialized, message)
    }

    /// Create a service-not-registered error.
    pub fn service_not_registered(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceNotRegistered, message)
    }

    /// Create a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Create a lifecycle error.
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lifecycle, message)
    }

    /// Create an installation error.
    pub fn installation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Installation, message)
    }

    /// Create a hook/command execution error.
    pub fn hook_execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HookExecution, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns true if this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

impl From<semver::Error> for AppError {
    fn from(err: semver::Error) -> Self {
        Self::with_source(
            ErrorKind::Validation,
            format!("Invalid version: {err}"),
            err,
        )
    }
}
