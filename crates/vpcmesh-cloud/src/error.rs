//! Cloud gateway error types

use thiserror::Error;

/// Provider error codes that mean "the resource is still referenced by
/// something that is going away". These clear up on their own once the
/// provider catches up with a termination.
const DEPENDENCY_CODES: &[&str] = &[
    "DependencyViolation",
    "InvalidIPAddress.InUse",
    "InvalidGroup.InUse",
    "InvalidAddress.Locked",
    "ResourceInUse",
];

/// Cloud gateway errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Unexpected response from {operation}: {message}")]
    UnexpectedResponse {
        operation: &'static str,
        message: String,
    },
}

impl CloudError {
    pub fn api(
        operation: &'static str,
        code: Option<impl Into<String>>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            operation,
            code: code.map(Into::into),
            message: message.into(),
        }
    }

    pub fn unexpected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            operation,
            message: message.into(),
        }
    }

    /// Provider error code, if the provider returned one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The referenced resource does not exist (yet, or any more).
    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|code| code.ends_with(".NotFound"))
    }

    /// The resource cannot be removed because something still uses it.
    pub fn is_dependency_violation(&self) -> bool {
        self.code()
            .is_some_and(|code| DEPENDENCY_CODES.contains(&code))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
