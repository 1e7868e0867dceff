//! Request identity and auth request/response types

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::error::AuthError;

/// Identity attached to a request by the authentication middleware.
///
/// Handlers take it as an argument; extraction fails closed with 401 when a
/// route was registered without the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl RequestIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Owners and admins may modify a resource
    pub fn can_modify(&self, owner_id: Uuid) -> bool {
        self.user_id == owner_id || self.is_admin()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or(AuthError::MissingIdentity)
    }
}

/// Access token plus raw refresh secret. Only ever returned to the caller.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// User registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Username must be 1-100 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 8, max = 72, message = "Password must be 8-72 characters"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Body returned by login and refresh; the refresh secret travels in a cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl From<&TokenPair> for TokenResponse {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }
}

/// `POST /auth/logout?all=true` revokes every session of the user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutQuery {
    #[serde(default)]
    pub all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "correct horse".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            username: String::new(),
            email: "not-an-email".into(),
            password: "short".into(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_password_upper_bound() {
        let req = RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "x".repeat(73),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_can_modify() {
        let owner = Uuid::new_v4();
        let me = RequestIdentity {
            user_id: owner,
            roles: vec!["user".into()],
        };
        assert!(me.can_modify(owner));
        assert!(!me.can_modify(Uuid::new_v4()));

        let admin = RequestIdentity {
            user_id: Uuid::new_v4(),
            roles: vec!["admin".into()],
        };
        assert!(admin.can_modify(owner));
    }
}
