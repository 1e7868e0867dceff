//! Access and refresh token issuance

use chrono::{DateTime, Utc};
use quill_core::{with_deadline, AuthConfig, CredentialStore, RefreshTokenRecord};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::error::AuthError;
use super::jwt::{Claims, JwtError, JwtKeys};
use super::models::TokenPair;
use super::refresh::{generate_refresh_secret, hash_refresh_token};

/// Issues signed access tokens and persisted refresh tokens.
///
/// Built once at startup and shared; holds no mutable state.
pub struct TokenIssuer {
    keys: JwtKeys,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    store: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl TokenIssuer {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            keys: JwtKeys::new(config.jwt_secret.as_bytes(), config.jwt_issuer.clone()),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
            store,
            store_timeout,
        }
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        roles: &[String],
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.keys
            .encode(user_id, roles, now, self.access_ttl)
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }

    /// Fresh secret and the unsaved row that stores its digest
    fn new_refresh_record(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(String, RefreshTokenRecord), AuthError> {
        let expires_at = now.checked_add_signed(self.refresh_ttl).ok_or_else(|| {
            AuthError::TokenSigning("refresh token lifetime out of range".to_string())
        })?;

        let secret = generate_refresh_secret();
        let mut record = RefreshTokenRecord::new(user_id, hash_refresh_token(&secret), expires_at);
        record.created_at = now;

        Ok((secret, record))
    }

    /// Generate a secret, persist its digest, then hand back the raw secret.
    pub async fn issue_refresh_token(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let (secret, record) = self.new_refresh_record(user_id, now)?;

        with_deadline(self.store_timeout, self.store.insert_refresh_token(&record))
            .await
            .map_err(AuthError::TokenPersist)?;

        Ok(secret)
    }

    pub async fn issue_pair(
        &self,
        user_id: Uuid,
        roles: &[String],
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let access_token = self.issue_access_token(user_id, roles, now)?;
        let refresh_token = self.issue_refresh_token(user_id, now).await?;

        Ok(self.pair(access_token, refresh_token))
    }

    /// Replace the refresh token stored under `old_hash` with a new pair.
    ///
    /// The old row is revoked and the new one stored in a single store call.
    /// `Ok(None)` means the old row was no longer active; on any error the
    /// old token stays usable.
    pub async fn rotate_pair(
        &self,
        old_hash: &str,
        user_id: Uuid,
        roles: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<TokenPair>, AuthError> {
        let access_token = self.issue_access_token(user_id, roles, now)?;
        let (refresh_token, record) = self.new_refresh_record(user_id, now)?;

        let rotated = with_deadline(
            self.store_timeout,
            self.store.rotate_refresh_token(old_hash, &record),
        )
        .await
        .map_err(AuthError::TokenPersist)?;

        Ok(rotated.then(|| self.pair(access_token, refresh_token)))
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds().max(0) as u64,
        }
    }

    pub fn verify_access_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        self.keys.decode(token, now).map_err(|e| match e {
            JwtError::ExpiredToken => AuthError::TokenExpired,
            JwtError::InvalidToken
            | JwtError::EncodingError(_)
            | JwtError::LifetimeOverflow => AuthError::TokenInvalid,
        })
    }
}
