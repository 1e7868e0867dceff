//! Quill Core - Domain models, storage traits, and shared types
//!
//! This crate defines the pieces shared by the API server and the CLI:
//! - Account and refresh-token models
//! - Post models and listing queries
//! - Storage traits with PostgreSQL and in-memory backends
//! - Configuration management

pub mod config;
pub mod post;
pub mod store;

pub use config::{AppConfig, AuthConfig, CacheConfig, ConfigError, DatabaseConfig};
pub use post::{NewPost, Post, PostQuery, PostUpdate, SortOrder};
pub use store::{
    with_deadline, CredentialStore, MemoryStore, PgStore, PostRepository, StoreError, StoreResult,
    UniqueField,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Roles
// ============================================================================

/// Roles known to the application.
///
/// Accounts store roles as plain strings so the set can grow without a
/// migration; this enum names the ones the routes check for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Invalid role: {s}")),
        }
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// A registered account.
///
/// `password_hash` is never serialized; use [`User::to_public`] for
/// anything that leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub verified: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New unverified account with the default `user` role
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            verified: false,
            roles: vec![UserRole::User.as_str().to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin.as_str())
    }

    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            verified: self.verified,
            roles: self.roles.clone(),
            created_at: self.created_at,
        }
    }
}

/// Account view safe to return to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub verified: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Refresh tokens
// ============================================================================

/// Persisted refresh token.
///
/// Only a digest of the secret is stored. Rows are never deleted on use;
/// they are flipped to `revoked` so a replay can be recognised later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshTokenRecord {
    pub fn new(user_id: Uuid, token_hash: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.into(),
            expires_at,
            created_at: Utc::now(),
            revoked: false,
        }
    }

    /// A token is expired once `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}
