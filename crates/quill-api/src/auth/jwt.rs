//! JWT access token encoding and validation
//!
//! HMAC-SHA256 only. Keys are derived from the secret once, at startup.
//! Expiry is compared against a caller-supplied `now` instead of the wall
//! clock so token lifetimes can be tested deterministically.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT claims embedded in every access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: String,
    /// Roles held when the token was issued
    pub roles: Vec<String>,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    /// Token issuer
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// JWT encoding and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token lifetime out of range")]
    LifetimeOverflow,
}

/// Signing and verification keys for one secret
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        // exp is checked against the injected clock in `decode`
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Build and sign claims for `user_id`
    pub fn encode(
        &self,
        user_id: Uuid,
        roles: &[String],
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<String, JwtError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(JwtError::LifetimeOverflow)?;
        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Validate signature, algorithm, issuer and required claims, then expiry.
    ///
    /// A token is expired once `now` is strictly past `exp`.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| JwtError::InvalidToken)?;

        let claims = token_data.claims;
        claims.user_id()?;

        if now.timestamp() > claims.exp {
            return Err(JwtError::ExpiredToken);
        }

        Ok(claims)
    }
}
