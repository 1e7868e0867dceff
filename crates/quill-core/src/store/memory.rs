//! In-memory store for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, PostRepository, StoreError, StoreResult, UniqueField};
use crate::post::{NewPost, Post, PostQuery, PostUpdate, SortOrder};
use crate::{RefreshTokenRecord, User};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    /// Keyed by token hash
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    /// Soft-deleted posts stay here with `Some(deleted_at)`
    posts: HashMap<Uuid, (Post, Option<DateTime<Utc>>)>,
}

/// Process-local store with the same semantics as [`super::PgStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate {
                field: UniqueField::Email,
            });
        }
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate {
                field: UniqueField::Username,
            });
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.refresh_tokens.contains_key(&record.token_hash) {
            return Err(StoreError::Database(
                "duplicate refresh token hash".to_string(),
            ));
        }
        state
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self
            .state
            .read()
            .await
            .refresh_tokens
            .get(token_hash)
            .cloned())
    }

    async fn find_latest_active_refresh_token(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let state = self.state.read().await;
        Ok(state
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id && r.is_active_at(now))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn revoke_refresh_token_if_active(&self, token_hash: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.refresh_tokens.get_mut(token_hash) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_record: &RefreshTokenRecord,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.refresh_tokens.contains_key(&new_record.token_hash) {
            return Err(StoreError::Database(
                "duplicate refresh token hash".to_string(),
            ));
        }
        match state.refresh_tokens.get_mut(old_hash) {
            Some(record) if !record.revoked => record.revoked = true,
            _ => return Ok(false),
        }
        state
            .refresh_tokens
            .insert(new_record.token_hash.clone(), new_record.clone());
        Ok(true)
    }

    async fn revoke_all_refresh_tokens_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let mut count = 0;
        for record in state.refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_active_refresh_tokens(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id && r.is_active_at(now))
            .count() as u64)
    }

    async fn delete_expired_refresh_tokens(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let initial = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, r| r.expires_at >= before);
        Ok((initial - state.refresh_tokens.len()) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create_post(&self, new: NewPost) -> StoreResult<Post> {
        let post = Post::from_new(new);
        self.state
            .write()
            .await
            .posts
            .insert(post.id, (post.clone(), None));
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        let state = self.state.read().await;
        Ok(match state.posts.get(&id) {
            Some((post, None)) => Some(post.clone()),
            _ => None,
        })
    }

    async fn list_posts(&self, query: &PostQuery) -> StoreResult<Vec<Post>> {
        let state = self.state.read().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|(_, deleted)| deleted.is_none())
            .map(|(post, _)| post)
            .filter(|post| query.matches(post))
            .cloned()
            .collect();

        posts.sort_by(|a, b| {
            let ord = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
            match query.sort {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        Ok(posts
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn update_post(&self, id: Uuid, update: &PostUpdate) -> StoreResult<Option<Post>> {
        let mut state = self.state.write().await;
        match state.posts.get_mut(&id) {
            Some((post, None)) => {
                post.apply(update);
                Ok(Some(post.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.posts.get_mut(&id) {
            Some((_, deleted @ None)) => {
                *deleted = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn user(name: &str) -> User {
        User::new(name, format!("{name}@example.com"), "hash")
    }

    #[tokio::test]
    async fn test_duplicate_email_and_username() {
        let store = MemoryStore::new();
        tokio_test::assert_ok!(store.insert_user(&user("alice")).await);

        let mut same_email = user("bob");
        same_email.email = "alice@example.com".to_string();
        assert!(matches!(
            store.insert_user(&same_email).await,
            Err(StoreError::Duplicate {
                field: UniqueField::Email
            })
        ));

        let mut same_name = user("alice");
        same_name.email = "other@example.com".to_string();
        assert!(matches!(
            store.insert_user(&same_name).await,
            Err(StoreError::Duplicate {
                field: UniqueField::Username
            })
        ));
    }

    #[tokio::test]
    async fn test_revoke_if_active_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("alice");
        store.insert_user(&owner).await.unwrap();
        let record = RefreshTokenRecord::new(owner.id, "h1", Utc::now() + Duration::days(1));
        store.insert_refresh_token(&record).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.revoke_refresh_token_if_active("h1").await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_rotate_revokes_and_inserts_together() {
        let store = MemoryStore::new();
        let owner = user("alice");
        let expires = Utc::now() + Duration::days(1);
        store
            .insert_refresh_token(&RefreshTokenRecord::new(owner.id, "r1", expires))
            .await
            .unwrap();

        let next = RefreshTokenRecord::new(owner.id, "r2", expires);
        assert!(store.rotate_refresh_token("r1", &next).await.unwrap());
        assert!(store.find_refresh_token_by_hash("r1").await.unwrap().unwrap().revoked);
        assert!(!store.find_refresh_token_by_hash("r2").await.unwrap().unwrap().revoked);

        // Losing side leaves no row behind
        let stray = RefreshTokenRecord::new(owner.id, "r3", expires);
        assert!(!store.rotate_refresh_token("r1", &stray).await.unwrap());
        assert!(!store.rotate_refresh_token("missing", &stray).await.unwrap());
        assert!(store.find_refresh_token_by_hash("r3").await.unwrap().is_none());

        // Hash collision fails without revoking the old row
        let clash = RefreshTokenRecord::new(owner.id, "r2", expires);
        assert!(store.rotate_refresh_token("r2", &clash).await.is_err());
        assert!(!store.find_refresh_token_by_hash("r2").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_latest_active_and_counts() {
        let store = MemoryStore::new();
        let owner = user("alice");
        let now = Utc::now();

        let mut older = RefreshTokenRecord::new(owner.id, "old", now + Duration::days(1));
        older.created_at = now - Duration::minutes(5);
        let newer = RefreshTokenRecord::new(owner.id, "new", now + Duration::days(1));
        let expired = RefreshTokenRecord::new(owner.id, "gone", now - Duration::seconds(1));

        for r in [&older, &newer, &expired] {
            store.insert_refresh_token(r).await.unwrap();
        }

        let latest = store
            .find_latest_active_refresh_token(owner.id, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.token_hash, "new");
        assert_eq!(store.count_active_refresh_tokens(owner.id, now).await.unwrap(), 2);

        assert_eq!(store.revoke_all_refresh_tokens_for_user(owner.id).await.unwrap(), 3);
        assert_eq!(store.count_active_refresh_tokens(owner.id, now).await.unwrap(), 0);

        assert_eq!(store.delete_expired_refresh_tokens(now).await.unwrap(), 1);
        assert!(store.find_refresh_token_by_hash("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_soft_delete_and_listing() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();

        let first = store
            .create_post(NewPost {
                title: "First".into(),
                content: "hello".into(),
                tags: vec!["rust".into()],
                author_id: author,
            })
            .await
            .unwrap();
        let second = store
            .create_post(NewPost {
                title: "Second".into(),
                content: "world".into(),
                tags: vec![],
                author_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        let all = store
            .list_posts(&PostQuery::default().normalized())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let mine = store
            .list_posts(
                &PostQuery {
                    author_id: Some(author),
                    ..Default::default()
                }
                .normalized(),
            )
            .await
            .unwrap();
        assert_eq!(mine, vec![first.clone()]);

        assert!(store.delete_post(second.id).await.unwrap());
        assert!(!store.delete_post(second.id).await.unwrap());
        assert!(store.get_post(second.id).await.unwrap().is_none());
        assert!(store
            .update_post(second.id, &PostUpdate::default())
            .await
            .unwrap()
            .is_none());
    }
}
