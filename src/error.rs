//! Error handling for the API.
//!
//! Every failure a resolver can report is a variant of [ApiError]. When adding
//! a variant, give it a status code in [ApiError::class] so the HTTP layer can
//! still tell bad input apart from a missing user or a server fault.

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// The error enum for all error handling across the API.
///
/// See each variant for the HTTP status its GraphQL response maps to.
#[derive(Debug, Error)]
pub enum ApiError {
    /// \[400\] The password did not match the stored hash.
    #[error("invalid password")]
    InvalidPassword,
    /// \[400\] The password is longer than bcrypt can hash without truncating it.
    #[error("password must be at most {0} bytes in length")]
    PasswordTooLong(usize),
    /// \[404\] No user matched the given identifier.
    #[error("user not found")]
    UserNotFound,
    /// \[400\] Another user already has the requested email or username.
    #[error("user name or email already exists")]
    UserAlreadyExists,
    /// \[403\] The caller's role does not allow the requested action.
    #[error("Access denied!")]
    AccessDenied,
    /// \[500\] The request reached a resolver without its users collection.
    ///
    /// This is a wiring bug: the HTTP boundary always builds a
    /// [RequestContext](crate::context::RequestContext) before executing.
    #[error("users collection missing from request context")]
    MissingCollectionInContext,
    /// \[500\] A required configuration value was not provided.
    #[error("configuration value {0} not found")]
    ConfigNotFound(String),
    /// \[500\] Configuration was present but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// \[500\] The secret store could not be read.
    #[error("failed to load secret: {0}")]
    Secrets(String),
    /// \[500\] Temporary database credentials could not be obtained.
    #[error("failed to assume database role: {0}")]
    Credentials(String),
    /// \[500\] The database could not be reached.
    #[error("error connecting to DB")]
    Connection(#[source] mongodb::error::Error),
    /// \[500\] A query against the database failed.
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    /// \[500\] Hashing or verifying a password failed for a reason other than a mismatch.
    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

/// The return type for all fallible operations in the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Coarse classification of an [ApiError], carried to clients as the
/// `code` extension of a GraphQL error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Forbidden,
    NotFound,
    Internal,
}

impl ErrorClass {
    pub const BAD_REQUEST: &'static str = "BAD_REQUEST";
    pub const FORBIDDEN: &'static str = "FORBIDDEN";
    pub const NOT_FOUND: &'static str = "NOT_FOUND";
    pub const INTERNAL: &'static str = "INTERNAL_SERVER_ERROR";

    pub fn code(&self) -> &'static str {
        match self {
            ErrorClass::BadRequest => Self::BAD_REQUEST,
            ErrorClass::Forbidden => Self::FORBIDDEN,
            ErrorClass::NotFound => Self::NOT_FOUND,
            ErrorClass::Internal => Self::INTERNAL,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            Self::BAD_REQUEST => Some(ErrorClass::BadRequest),
            Self::FORBIDDEN => Some(ErrorClass::Forbidden),
            Self::NOT_FOUND => Some(ErrorClass::NotFound),
            Self::INTERNAL => Some(ErrorClass::Internal),
            _ => None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ErrorClass::BadRequest => 400,
            ErrorClass::Forbidden => 403,
            ErrorClass::NotFound => 404,
            ErrorClass::Internal => 500,
        }
    }
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::InvalidPassword
            | ApiError::PasswordTooLong(_)
            | ApiError::UserAlreadyExists => ErrorClass::BadRequest,
            ApiError::AccessDenied => ErrorClass::Forbidden,
            ApiError::UserNotFound => ErrorClass::NotFound,
            ApiError::MissingCollectionInContext
            | ApiError::ConfigNotFound(_)
            | ApiError::Config(_)
            | ApiError::Secrets(_)
            | ApiError::Credentials(_)
            | ApiError::Connection(_)
            | ApiError::Database(_)
            | ApiError::Hashing(_) => ErrorClass::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        self.class().status()
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, extensions| extensions.set("code", self.class().code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_client_messages() {
        assert_eq!(ApiError::InvalidPassword.to_string(), "invalid password");
        assert_eq!(ApiError::UserNotFound.to_string(), "user not found");
        assert_eq!(
            ApiError::UserAlreadyExists.to_string(),
            "user name or email already exists"
        );
    }

    #[test]
    fn classification_drives_status_codes() {
        assert_eq!(ApiError::InvalidPassword.status(), 400);
        assert_eq!(ApiError::UserAlreadyExists.status(), 400);
        assert_eq!(ApiError::PasswordTooLong(72).status(), 400);
        assert_eq!(ApiError::AccessDenied.status(), 403);
        assert_eq!(ApiError::UserNotFound.status(), 404);
        assert_eq!(ApiError::MissingCollectionInContext.status(), 500);
        assert_eq!(ApiError::ConfigNotFound("SECRET_NAME".into()).status(), 500);
    }

    #[test]
    fn codes_round_trip_through_extensions() {
        let error = ApiError::UserNotFound.extend();
        assert_eq!(error.message, "user not found");

        let code = error
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .cloned();
        assert_eq!(
            code,
            Some(async_graphql::Value::from(ErrorClass::NOT_FOUND))
        );
        assert_eq!(
            ErrorClass::from_code(ErrorClass::NOT_FOUND),
            Some(ErrorClass::NotFound)
        );
    }
}
