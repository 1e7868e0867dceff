//! Storage traits and backends
//!
//! Services hold `Arc<dyn CredentialStore>` / `Arc<dyn PostRepository>` and
//! never see which backend sits underneath. [`PgStore`] is the production
//! backend; [`MemoryStore`] backs tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::post::{NewPost, Post, PostQuery, PostUpdate};
use crate::{RefreshTokenRecord, User};

/// Column covered by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Email => f.write_str("email"),
            UniqueField::Username => f.write_str("username"),
        }
    }
}

/// Storage failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate value for {field}")]
    Duplicate { field: UniqueField },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Bound a store call by `limit`; elapsed calls become [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Accounts and refresh-token rows
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Email lookup; callers pass the address already lowercased
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Fails with [`StoreError::Duplicate`] on email or username collision
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Accounts ordered by creation time
    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<User>>;

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>>;

    /// Most recently created unrevoked, unexpired token of a user
    async fn find_latest_active_refresh_token(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshTokenRecord>>;

    /// Revoke the row only if it is still unrevoked.
    ///
    /// Returns `true` for exactly one caller when several race on the same
    /// row; every other caller sees `false`.
    async fn revoke_refresh_token_if_active(&self, token_hash: &str) -> StoreResult<bool>;

    /// Revoke `old_hash` and insert `new_record` as one unit.
    ///
    /// Returns `false` without inserting when the old row is missing or
    /// already revoked. On error neither change is applied.
    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_record: &RefreshTokenRecord,
    ) -> StoreResult<bool>;

    /// Revoke every token of a user, returning how many rows changed
    async fn revoke_all_refresh_tokens_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    async fn count_active_refresh_tokens(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Housekeeping: drop rows that expired before `before`
    async fn delete_expired_refresh_tokens(&self, before: DateTime<Utc>) -> StoreResult<u64>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> StoreResult<()>;
}

/// Post persistence
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create_post(&self, new: NewPost) -> StoreResult<Post>;

    /// Soft-deleted posts are invisible
    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>>;

    /// `query` must already be normalized
    async fn list_posts(&self, query: &PostQuery) -> StoreResult<Vec<Post>>;

    async fn update_post(&self, id: Uuid, update: &PostUpdate) -> StoreResult<Option<Post>>;

    /// Soft delete; `false` when no live post had that id
    async fn delete_post(&self, id: Uuid) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result: StoreResult<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_result() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
