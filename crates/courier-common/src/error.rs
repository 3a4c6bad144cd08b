//! Error types for Courier

use thiserror::Error;

/// Main error type for Courier
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected storage or queue failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Failure talking to UAA or the Cloud Controller
    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist or is not owned by the caller's client
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation disallowed for the caller's scopes
    #[error("Permission denied: {0}")]
    Permissions(String),

    /// Broadcast to a scope every user holds
    #[error("You cannot send a notification to a default scope: {0}")]
    DefaultScope(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Courier
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Persistence(_) => 500,
            Error::Directory(_) => 500,
            Error::Auth(_) => 401,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::Permissions(_) => 403,
            Error::DefaultScope(_) => 422,
            Error::Unknown(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Persistence(_) => "PERSISTENCE_ERROR",
            Error::Directory(_) => "DIRECTORY_ERROR",
            Error::Auth(_) => "UNAUTHORIZED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Permissions(_) => "FORBIDDEN",
            Error::DefaultScope(_) => "DEFAULT_SCOPE",
            Error::Unknown(_) => "UNKNOWN_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a retry of the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Persistence(_) | Error::Directory(_) | Error::Unknown(_) | Error::Other(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound("campaign".into()).status_code(), 404);
        assert_eq!(Error::Permissions("critical".into()).status_code(), 403);
        assert_eq!(Error::Validation("role".into()).status_code(), 422);
        assert_eq!(Error::DefaultScope("openid".into()).status_code(), 422);
        assert_eq!(Error::Persistence("queue".into()).status_code(), 500);
    }

    #[test]
    fn test_default_scope_message() {
        let err = Error::DefaultScope("openid".into());
        assert_eq!(
            err.to_string(),
            "You cannot send a notification to a default scope: openid"
        );
        assert!(!err.is_transient());
    }
}
