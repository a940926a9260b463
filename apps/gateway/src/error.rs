use parley_common::GroupId;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Failures a gateway operation can report.
///
/// Which of these reach the client is decided by the caller: `Forbidden` is
/// logged and swallowed, everything else becomes a `REQUEST_REJECTED`
/// dispatch on the initiating connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("connection is not bound to an identity")]
    Unbound,
    #[error("connection is already bound or binding")]
    AlreadyBound,
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(#[from] DirectoryError),
    #[error("sender is not a member of group {0}")]
    Forbidden(GroupId),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unbound => "UNBOUND",
            Self::AlreadyBound => "ALREADY_BOUND",
            Self::DirectoryUnavailable(_) => "DIRECTORY_UNAVAILABLE",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}
