//! Error taxonomy for the cloud client.
//!
//! Every failure is a `CannotConnect` in the broad sense; two remote error codes
//! narrow it down to `InvalidCredentials` (login rejected) or `ExpiredToken`
//! (authenticated call rejected, a fresh login is needed).

use core::fmt;
use std::error::Error;

/// Remote error code returned by `login` for a wrong email or password.
pub const CODE_INVALID_CREDENTIALS: i64 = -20601;
/// Remote error code returned by authenticated calls once the token is stale.
pub const CODE_EXPIRED_TOKEN: i64 = -20651;

/// Remote error codes with a more specific meaning than "cannot connect".
/// Codes not listed here classify as [`ErrorKind::CannotConnect`].
pub const ERROR_CODES: &[(i64, ErrorKind)] = &[
    (CODE_INVALID_CREDENTIALS, ErrorKind::InvalidCredentials),
    (CODE_EXPIRED_TOKEN, ErrorKind::ExpiredToken),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CannotConnect,
    InvalidCredentials,
    ExpiredToken,
}

impl ErrorKind {
    pub fn from_code(code: i64) -> ErrorKind {
        ERROR_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::CannotConnect)
    }

    /// Whether this kind counts as a connectivity failure. Both specific kinds
    /// are connectivity failures with a known cause.
    pub fn is_cannot_connect(self) -> bool {
        match self {
            ErrorKind::CannotConnect | ErrorKind::InvalidCredentials | ErrorKind::ExpiredToken => true,
        }
    }
}

#[derive(Debug)]
pub enum CloudError {
    /// An authenticated call was attempted before any token was obtained.
    MissingToken,
    Transport(String),
    Http { status: u16, message: String },
    Json(String),
    /// Non-zero `error_code` in the response envelope.
    Remote { kind: ErrorKind, code: i64, message: String },
    /// Non-zero `err_code` inside a device response.
    Device { code: i64, message: String },
}

impl CloudError {
    pub fn from_remote(code: i64, message: impl Into<String>) -> CloudError {
        CloudError::Remote {
            kind: ErrorKind::from_code(code),
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            // A session without a token needs the same recovery as a stale one.
            CloudError::MissingToken => ErrorKind::ExpiredToken,
            CloudError::Remote { kind, .. } => *kind,
            CloudError::Transport(_) | CloudError::Http { .. } | CloudError::Json(_) | CloudError::Device { .. } => {
                ErrorKind::CannotConnect
            }
        }
    }

    pub fn is_invalid_credentials(&self) -> bool {
        self.kind() == ErrorKind::InvalidCredentials
    }

    pub fn is_expired_token(&self) -> bool {
        self.kind() == ErrorKind::ExpiredToken
    }

    /// The remote error code, if the failure came from the cloud envelope.
    pub fn code(&self) -> Option<i64> {
        match self {
            CloudError::Remote { code, .. } | CloudError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudError::MissingToken => write!(f, "no token available for authenticated call"),
            CloudError::Transport(s) => write!(f, "transport error: {}", s),
            CloudError::Http { status, message } => write!(f, "http {}: {}", status, message),
            CloudError::Json(e) => write!(f, "json error: {}", e),
            CloudError::Remote { code, message, .. } | CloudError::Device { code, message } => {
                write!(f, "{} ({})", message, code)
            }
        }
    }
}

impl Error for CloudError {}

impl From<serde_json::Error> for CloudError {
    fn from(value: serde_json::Error) -> Self {
        CloudError::Json(value.to_string())
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for CloudError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        CloudError::Json(value.to_string())
    }
}
