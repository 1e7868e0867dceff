//! Authentication and session errors
//!
//! Client-facing messages are deliberately coarse: the three refresh
//! failures share one message, and unknown email, unverified account and
//! wrong password share another.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quill_core::{StoreError, UniqueField};
use thiserror::Error;

use super::password::PasswordError;
use crate::error::{ApiError, FieldError};

/// Shown for every refresh failure
pub const REFRESH_FAILED_MESSAGE: &str = "refresh token is invalid or expired, please log in again";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("missing bearer token")]
    MissingToken,

    #[error("access token is invalid")]
    TokenInvalid,

    #[error("access token has expired")]
    TokenExpired,

    #[error("refresh token not recognised")]
    InvalidRefreshToken,

    #[error("refresh token has expired")]
    RefreshTokenExpired,

    #[error("refresh token reuse detected")]
    RefreshTokenReused,

    #[error("access denied")]
    AccessDenied,

    #[error("request identity missing; route is not behind the authentication layer")]
    MissingIdentity,

    #[error("email already in use")]
    EmailAlreadyUsed,

    #[error("username already taken")]
    UsernameTaken,

    #[error("password hashing failed: {0}")]
    Hashing(#[from] PasswordError),

    #[error("token signing failed: {0}")]
    TokenSigning(String),

    #[error("failed to persist refresh token: {0}")]
    TokenPersist(StoreError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate {
                field: UniqueField::Email,
            } => AuthError::EmailAlreadyUsed,
            StoreError::Duplicate {
                field: UniqueField::Username,
            } => AuthError::UsernameTaken,
            other => AuthError::Store(other),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::TokenInvalid
            | AuthError::TokenExpired
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenExpired
            | AuthError::RefreshTokenReused
            | AuthError::MissingIdentity => StatusCode::UNAUTHORIZED,
            AuthError::AccessDenied => StatusCode::FORBIDDEN,
            AuthError::EmailAlreadyUsed | AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::Store(StoreError::Timeout(_))
            | AuthError::TokenPersist(StoreError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Hashing(_)
            | AuthError::TokenSigning(_)
            | AuthError::TokenPersist(_)
            | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_FAILED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::MissingToken => "AUTH_TOKEN_MISSING",
            AuthError::TokenInvalid => "AUTH_TOKEN_INVALID",
            AuthError::TokenExpired => "AUTH_TOKEN_EXPIRED",
            AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenExpired
            | AuthError::RefreshTokenReused => "INVALID_REFRESH_TOKEN",
            AuthError::AccessDenied => "ACCESS_DENIED",
            AuthError::MissingIdentity => "AUTH_REQUIRED",
            AuthError::EmailAlreadyUsed => "EMAIL_ALREADY_USED",
            AuthError::UsernameTaken => "USERNAME_TAKEN",
            AuthError::Store(StoreError::Timeout(_))
            | AuthError::TokenPersist(StoreError::Timeout(_)) => "STORE_TIMEOUT",
            AuthError::Hashing(_)
            | AuthError::TokenSigning(_)
            | AuthError::TokenPersist(_)
            | AuthError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "Validation failed",
            AuthError::InvalidCredentials => "invalid email or password",
            AuthError::MissingToken => "authentication required",
            AuthError::TokenInvalid => "access token is invalid",
            AuthError::TokenExpired => "access token has expired",
            AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenExpired
            | AuthError::RefreshTokenReused => REFRESH_FAILED_MESSAGE,
            AuthError::AccessDenied => "you do not have permission to access this resource",
            AuthError::MissingIdentity => "authentication required",
            AuthError::EmailAlreadyUsed => "email is already registered",
            AuthError::UsernameTaken => "username is already taken",
            AuthError::Store(StoreError::Timeout(_))
            | AuthError::TokenPersist(StoreError::Timeout(_)) => "Service temporarily unavailable",
            AuthError::Hashing(_)
            | AuthError::TokenSigning(_)
            | AuthError::TokenPersist(_)
            | AuthError::Store(_) => "Internal server error",
        }
    }

    /// Refresh failures that should also clear the refresh cookie
    pub fn is_refresh_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidRefreshToken
                | AuthError::RefreshTokenExpired
                | AuthError::RefreshTokenReused
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "authentication subsystem failure");
        } else if matches!(self, AuthError::MissingIdentity) {
            tracing::error!("handler requires an identity but none was set; check route layering");
        }

        let mut error = ApiError::new(self.code(), self.client_message());
        if let AuthError::Validation(fields) = self {
            error = error.with_details(fields);
        }

        error.into_response_with(status)
    }
}
