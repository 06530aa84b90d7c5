use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad category of a failed network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The service answered with a modeled or unmodeled error.
    Service,
    /// The request never produced a response (DNS, connect, TLS, IO).
    Dispatch,
    /// The request or the connection timed out.
    Timeout,
    /// A well-formed response lacked data the call needs.
    Response,
    /// The request could not be built.
    Construction,
}

/// A failed STS or IAM call, detached from the SDK error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub operation: &'static str,
    pub kind: ApiErrorKind,
    pub code: Option<String>,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn service(
        operation: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind: ApiErrorKind::Service,
            code: Some(code.into()),
            message: message.into(),
            status: None,
        }
    }

    pub fn dispatch(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind: ApiErrorKind::Dispatch,
            code: None,
            message: message.into(),
            status: None,
        }
    }

    pub fn timeout(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Timeout,
            ..Self::dispatch(operation, message)
        }
    }

    pub fn response(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Response,
            ..Self::dispatch(operation, message)
        }
    }

    pub fn construction(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Construction,
            ..Self::dispatch(operation, message)
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.operation)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        match &self.code {
            Some(code) => write!(f, ": {code}: {}", self.message),
            None => write!(f, ": {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Errors surfaced by credential resolution.
///
/// Exactly one of these (or a session) comes back from a resolution call.
/// `AccountLookupIncomplete` is the exception: it is only ever attached to a
/// successful session as a soft condition.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no valid credential sources found{}", detail_suffix(.detail))]
    NoValidCredentialSources { detail: Option<String> },

    #[error("cannot assume IAM role {role_arn:?}: {reason}")]
    CannotAssumeRole {
        role_arn: String,
        reason: String,
        #[source]
        source: Option<ApiError>,
    },

    #[error("profile {profile:?} not found in shared files [{}]", display_paths(.files))]
    InvalidProfile { profile: String, files: Vec<PathBuf> },

    #[error("invalid session configuration for profile {profile:?}: {message}")]
    SessionConfiguration { profile: String, message: String },

    #[error("validating provider credentials: {0}")]
    ValidationFailed(#[source] ApiError),

    #[error("AWS account ID not found for provider: {}", display_errors(.errors))]
    AccountLookupIncomplete { errors: Vec<ApiError> },

    #[error("failed to load shared file {}: {source}", .path.display())]
    SharedFile {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("credential resolution timed out after {0:?}")]
    Timeout(Duration),
}

/// Coarse classification of [`Error`] for callers that branch on outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoCredentials,
    RoleAdoption,
    Configuration,
    Validation,
    AccountLookup,
    Timeout,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoValidCredentialSources { .. } => ErrorKind::NoCredentials,
            Error::CannotAssumeRole { .. } => ErrorKind::RoleAdoption,
            Error::InvalidProfile { .. }
            | Error::SessionConfiguration { .. }
            | Error::SharedFile { .. }
            | Error::InvalidConfiguration(_) => ErrorKind::Configuration,
            Error::ValidationFailed(_) => ErrorKind::Validation,
            Error::AccountLookupIncomplete { .. } => ErrorKind::AccountLookup,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// True when the error was detected without making any network call.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::CannotAssumeRole { source, .. } => source.is_none(),
            other => other.kind() == ErrorKind::Configuration,
        }
    }

    pub(crate) fn invalid_role(role_arn: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CannotAssumeRole {
            role_arn: role_arn.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn session_configuration(
        profile: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::SessionConfiguration {
            profile: profile.into(),
            message: message.into(),
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

fn display_paths(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_errors(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "no lookup method succeeded".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
