//! Session service
//!
//! Registration, login, logout and refresh-token rotation on top of a
//! [`CredentialStore`] and a [`TokenIssuer`].

use chrono::{DateTime, Utc};
use quill_core::{with_deadline, CredentialStore, RefreshTokenRecord, User, UserRole};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use super::error::AuthError;
use super::issuer::TokenIssuer;
use super::models::{LoginRequest, RegisterRequest, RequestIdentity, TokenPair};
use super::password::{
    hash_password_blocking, hash_password_with_config, validate_password_strength,
    verify_password_blocking, PasswordConfig,
};
use super::refresh::hash_refresh_token;
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::{validation_errors_to_field_errors, FieldError};

/// Verified against for unknown emails so every login path costs one hash
const DUMMY_PASSWORD: &str = "quill-dummy-password-for-timing";

pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    issuer: Arc<TokenIssuer>,
    password: PasswordConfig,
    store_timeout: Duration,
    auto_verify: bool,
    dummy_hash: String,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: Arc<TokenIssuer>,
        password: PasswordConfig,
        store_timeout: Duration,
        auto_verify: bool,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hash_password_with_config(DUMMY_PASSWORD, &password)?;

        Ok(Self {
            store,
            issuer,
            password,
            store_timeout,
            auto_verify,
            dummy_hash,
        })
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Self-service registration. Accounts start unverified unless the
    /// service was built with `auto_verify`.
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<User, AuthError> {
        let email = normalize_email(&request.email);
        let result = self
            .create_account(
                request,
                self.auto_verify,
                vec![UserRole::User.as_str().to_string()],
            )
            .await;

        match &result {
            Ok(user) => audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                username: user.username.clone(),
                ip_address: client.ip_address.clone(),
            }),
            Err(err) => audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: err.to_string(),
                ip_address: client.ip_address.clone(),
            }),
        }

        result
    }

    /// Create an account with explicit verification state and roles.
    ///
    /// Used by registration and by operator seeding.
    pub async fn create_account(
        &self,
        mut request: RegisterRequest,
        verified: bool,
        roles: Vec<String>,
    ) -> Result<User, AuthError> {
        request.email = normalize_email(&request.email);
        request.username = request.username.trim().to_string();

        validate_register(&request)?;

        let password_hash =
            hash_password_blocking(request.password, self.password.clone()).await?;

        let user = User::new(request.username, request.email, password_hash)
            .verified(verified)
            .with_roles(roles);

        with_deadline(self.store_timeout, self.store.insert_user(&user)).await?;

        tracing::debug!(user_id = %user.id, "account created");
        Ok(user)
    }

    /// Authenticate with email and password.
    ///
    /// Unknown email, wrong password and unverified account all yield
    /// [`AuthError::InvalidCredentials`] after exactly one hash verification.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<(User, TokenPair), AuthError> {
        let email = normalize_email(&request.email);
        let request = LoginRequest {
            email: email.clone(),
            password: request.password,
        };
        request
            .validate()
            .map_err(|e| AuthError::Validation(validation_errors_to_field_errors(&e)))?;

        let user = with_deadline(self.store_timeout, self.store.find_user_by_email(&email)).await?;

        let reject = |reason: &str| {
            audit_log(&AuditEvent::LoginFailure {
                email: email.clone(),
                reason: reason.to_string(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
            });
            AuthError::InvalidCredentials
        };

        let Some(user) = user else {
            let _ = verify_password_blocking(request.password, self.dummy_hash.clone()).await;
            return Err(reject("unknown email"));
        };

        let matches =
            match verify_password_blocking(request.password, user.password_hash.clone()).await {
                Ok(matches) => matches,
                Err(err) => {
                    tracing::error!(user_id = %user.id, error = %err, "stored password hash is unusable");
                    return Err(reject("unreadable password hash"));
                }
            };
        if !matches {
            return Err(reject("wrong password"));
        }
        if !user.verified {
            return Err(reject("account not verified"));
        }

        let pair = self
            .issuer
            .issue_pair(user.id, &user.roles, Utc::now())
            .await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok((user, pair))
    }

    /// Revoke the caller's current session.
    ///
    /// Targets the presented refresh token when it belongs to the caller,
    /// otherwise the caller's newest active token. Returns the number of rows
    /// revoked; repeating a logout revokes nothing and still succeeds.
    pub async fn logout(
        &self,
        identity: &RequestIdentity,
        presented: Option<&str>,
        client: &ClientInfo,
    ) -> Result<u64, AuthError> {
        let now = Utc::now();

        let presented_row = match presented {
            Some(raw) => with_deadline(
                self.store_timeout,
                self.store
                    .find_refresh_token_by_hash(&hash_refresh_token(raw)),
            )
            .await?
            .filter(|row| row.user_id == identity.user_id),
            None => None,
        };

        let target: Option<RefreshTokenRecord> = match presented_row {
            Some(row) => Some(row),
            None => {
                with_deadline(
                    self.store_timeout,
                    self.store
                        .find_latest_active_refresh_token(identity.user_id, now),
                )
                .await?
            }
        };

        let revoked = match target {
            Some(row) if !row.revoked => {
                let changed = with_deadline(
                    self.store_timeout,
                    self.store.revoke_refresh_token_if_active(&row.token_hash),
                )
                .await?;
                u64::from(changed)
            }
            _ => 0,
        };

        audit_log(&AuditEvent::Logout {
            user_id: identity.user_id,
            all_devices: false,
            revoked,
            ip_address: client.ip_address.clone(),
        });

        Ok(revoked)
    }

    /// Revoke every refresh token of the caller
    pub async fn logout_all(
        &self,
        identity: &RequestIdentity,
        client: &ClientInfo,
    ) -> Result<u64, AuthError> {
        let revoked = with_deadline(
            self.store_timeout,
            self.store
                .revoke_all_refresh_tokens_for_user(identity.user_id),
        )
        .await?;

        audit_log(&AuditEvent::Logout {
            user_id: identity.user_id,
            all_devices: true,
            revoked,
            ip_address: client.ip_address.clone(),
        });

        Ok(revoked)
    }

    /// Exchange a refresh token for a new pair, revoking the presented one
    pub async fn refresh_tokens(
        &self,
        raw: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        self.refresh_tokens_at(raw, Utc::now(), client).await
    }

    /// Rotation against an explicit clock.
    ///
    /// A revoked token, or losing the race to revoke a live one, counts as
    /// reuse: every token of the owner is revoked.
    pub async fn refresh_tokens_at(
        &self,
        raw: &str,
        now: DateTime<Utc>,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        let result = self.rotate(raw, now).await;

        match &result {
            Ok((user_id, _)) => audit_log(&AuditEvent::TokenRefresh {
                user_id: *user_id,
                ip_address: client.ip_address.clone(),
            }),
            Err(err) if err.is_refresh_failure() => audit_log(&AuditEvent::RefreshFailure {
                reason: err.to_string(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
            }),
            Err(_) => {}
        }

        result.map(|(_, pair)| pair)
    }

    async fn rotate(&self, raw: &str, now: DateTime<Utc>) -> Result<(Uuid, TokenPair), AuthError> {
        let token_hash = hash_refresh_token(raw);

        let record = with_deadline(
            self.store_timeout,
            self.store.find_refresh_token_by_hash(&token_hash),
        )
        .await?
        .ok_or(AuthError::InvalidRefreshToken)?;

        if record.is_expired_at(now) {
            return Err(AuthError::RefreshTokenExpired);
        }

        if record.revoked {
            return Err(self.revoke_after_reuse(record.user_id).await);
        }

        let user = with_deadline(self.store_timeout, self.store.find_user_by_id(record.user_id))
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        match self
            .issuer
            .rotate_pair(&token_hash, user.id, &user.roles, now)
            .await?
        {
            Some(pair) => Ok((user.id, pair)),
            // Someone else rotated this token between our read and write
            None => Err(self.revoke_after_reuse(record.user_id).await),
        }
    }

    async fn revoke_after_reuse(&self, user_id: Uuid) -> AuthError {
        match with_deadline(
            self.store_timeout,
            self.store.revoke_all_refresh_tokens_for_user(user_id),
        )
        .await
        {
            Ok(revoked_count) => {
                audit_log(&AuditEvent::RefreshTokenReuse {
                    user_id,
                    revoked_count,
                });
                AuthError::RefreshTokenReused
            }
            Err(err) => {
                tracing::error!(%user_id, error = %err, "failed to revoke sessions after refresh token reuse");
                AuthError::Store(err)
            }
        }
    }

    /// Account behind an identity, if it still exists
    pub async fn current_user(&self, identity: &RequestIdentity) -> Result<Option<User>, AuthError> {
        Ok(with_deadline(self.store_timeout, self.store.find_user_by_id(identity.user_id)).await?)
    }

    /// Operator housekeeping: drop refresh-token rows that expired before `before`
    pub async fn prune_expired(&self, before: DateTime<Utc>) -> Result<u64, AuthError> {
        Ok(with_deadline(
            self.store_timeout,
            self.store.delete_expired_refresh_tokens(before),
        )
        .await?)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_register(request: &RegisterRequest) -> Result<(), AuthError> {
    let mut fields: Vec<FieldError> = match request.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => validation_errors_to_field_errors(&errors),
    };

    if !fields.iter().any(|f| f.field == "password") {
        if let Err(message) = validate_password_strength(&request.password) {
            fields.push(FieldError {
                field: "password".to_string(),
                message,
            });
        }
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::async_trait;
    use quill_core::{AuthConfig, MemoryStore, StoreError, StoreResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        store: Arc<MemoryStore>,
        service: SessionService,
    }

    fn harness(auto_verify: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let service = service_over(store.clone(), auto_verify);
        Harness { store, service }
    }

    fn service_over(store: Arc<dyn CredentialStore>, auto_verify: bool) -> SessionService {
        let config = AuthConfig {
            jwt_secret: "session-test-secret-session-test-secret".to_string(),
            ..Default::default()
        };
        let issuer = Arc::new(TokenIssuer::new(
            &config,
            store.clone(),
            Duration::from_secs(1),
        ));
        SessionService::new(
            store,
            issuer,
            PasswordConfig::fast_insecure(),
            Duration::from_secs(1),
            auto_verify,
        )
        .unwrap()
    }

    /// Memory store whose rotation fails while `fail_rotation` is set
    #[derive(Default)]
    struct UnreliableStore {
        inner: MemoryStore,
        fail_rotation: AtomicBool,
    }

    #[async_trait]
    impl CredentialStore for UnreliableStore {
        async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
            self.inner.find_user_by_id(id).await
        }

        async fn insert_user(&self, user: &User) -> StoreResult<()> {
            self.inner.insert_user(user).await
        }

        async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
            self.inner.list_users(limit, offset).await
        }

        async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
            self.inner.insert_refresh_token(record).await
        }

        async fn find_refresh_token_by_hash(
            &self,
            token_hash: &str,
        ) -> StoreResult<Option<RefreshTokenRecord>> {
            self.inner.find_refresh_token_by_hash(token_hash).await
        }

        async fn find_latest_active_refresh_token(
            &self,
            user_id: Uuid,
            now: DateTime<Utc>,
        ) -> StoreResult<Option<RefreshTokenRecord>> {
            self.inner.find_latest_active_refresh_token(user_id, now).await
        }

        async fn revoke_refresh_token_if_active(&self, token_hash: &str) -> StoreResult<bool> {
            self.inner.revoke_refresh_token_if_active(token_hash).await
        }

        async fn rotate_refresh_token(
            &self,
            old_hash: &str,
            new_record: &RefreshTokenRecord,
        ) -> StoreResult<bool> {
            if self.fail_rotation.load(Ordering::SeqCst) {
                return Err(StoreError::Database("connection reset".to_string()));
            }
            self.inner.rotate_refresh_token(old_hash, new_record).await
        }

        async fn revoke_all_refresh_tokens_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
            self.inner.revoke_all_refresh_tokens_for_user(user_id).await
        }

        async fn count_active_refresh_tokens(
            &self,
            user_id: Uuid,
            now: DateTime<Utc>,
        ) -> StoreResult<u64> {
            self.inner.count_active_refresh_tokens(user_id, now).await
        }

        async fn delete_expired_refresh_tokens(&self, before: DateTime<Utc>) -> StoreResult<u64> {
            self.inner.delete_expired_refresh_tokens(before).await
        }

        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }
    }

    fn register_request(name: &str) -> RegisterRequest {
        RegisterRequest {
            username: name.to_string(),
            email: format!("{name}@Example.com"),
            password: "correct horse battery".to_string(),
        }
    }

    fn login_request(name: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: format!("{name}@example.com"),
            password: password.to_string(),
        }
    }

    fn client() -> ClientInfo {
        ClientInfo::default()
    }

    async fn verified_user(h: &Harness, name: &str) -> User {
        h.service
            .create_account(register_request(name), true, vec!["user".to_string()])
            .await
            .unwrap()
    }

    fn identity(user: &User) -> RequestIdentity {
        RequestIdentity {
            user_id: user.id,
            roles: user.roles.clone(),
        }
    }

    #[tokio::test]
    async fn test_register_defaults() {
        let h = harness(false);
        let user = h
            .service
            .register(register_request("alice"), &client())
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert!(!user.verified);
        assert_eq!(user.roles, vec!["user".to_string()]);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_duplicates() {
        let h = harness(false);
        h.service
            .register(register_request("alice"), &client())
            .await
            .unwrap();

        let dup_email = RegisterRequest {
            username: "other".into(),
            ..register_request("alice")
        };
        assert!(matches!(
            h.service.register(dup_email, &client()).await,
            Err(AuthError::EmailAlreadyUsed)
        ));

        let dup_name = RegisterRequest {
            email: "fresh@example.com".into(),
            ..register_request("alice")
        };
        assert!(matches!(
            h.service.register(dup_name, &client()).await,
            Err(AuthError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let h = harness(false);
        let bad = RegisterRequest {
            username: "   ".into(),
            email: "nope".into(),
            password: "short".into(),
        };
        match h.service.register(bad, &client()).await {
            Err(AuthError::Validation(fields)) => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert!(names.contains(&"username"));
                assert!(names.contains(&"email"));
                assert!(names.contains(&"password"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_failures_are_identical() {
        let h = harness(false);
        verified_user(&h, "alice").await;
        h.service
            .register(register_request("bob"), &client())
            .await
            .unwrap();

        let cases = [
            login_request("nobody", "correct horse battery"),
            login_request("alice", "wrong password!"),
            login_request("bob", "correct horse battery"),
        ];
        for case in cases {
            let err = h.service.login(case, &client()).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
            assert_eq!(err.client_message(), "invalid email or password");
        }
    }

    #[tokio::test]
    async fn test_auto_verify_allows_login() {
        let h = harness(true);
        h.service
            .register(register_request("carol"), &client())
            .await
            .unwrap();
        assert!(h
            .service
            .login(login_request("carol", "correct horse battery"), &client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_login_issues_pair() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;

        let (logged_in, pair) = h
            .service
            .login(login_request("ALICE", "correct horse battery"), &client())
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let claims = h
            .service
            .issuer()
            .verify_access_token(&pair.access_token, Utc::now())
            .unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert_eq!(
            h.store
                .count_active_refresh_tokens(user.id, Utc::now())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_refresh_rotates_then_detects_reuse() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;
        let (_, first) = h
            .service
            .login(login_request("alice", "correct horse battery"), &client())
            .await
            .unwrap();

        let second = h
            .service
            .refresh_tokens(&first.refresh_token, &client())
            .await
            .unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let old = h
            .store
            .find_refresh_token_by_hash(&hash_refresh_token(&first.refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert!(old.revoked);

        // Replaying the rotated token revokes everything, including `second`
        assert!(matches!(
            h.service.refresh_tokens(&first.refresh_token, &client()).await,
            Err(AuthError::RefreshTokenReused)
        ));
        assert_eq!(
            h.store
                .count_active_refresh_tokens(user.id, Utc::now())
                .await
                .unwrap(),
            0
        );
        assert!(matches!(
            h.service.refresh_tokens(&second.refresh_token, &client()).await,
            Err(AuthError::RefreshTokenReused)
        ));
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_session_usable() {
        let store = Arc::new(UnreliableStore::default());
        let service = service_over(store.clone(), false);
        service
            .create_account(register_request("alice"), true, vec!["user".to_string()])
            .await
            .unwrap();

        let (user, first) = service
            .login(login_request("alice", "correct horse battery"), &client())
            .await
            .unwrap();
        let (_, other) = service
            .login(login_request("alice", "correct horse battery"), &client())
            .await
            .unwrap();

        store.fail_rotation.store(true, Ordering::SeqCst);
        let err = service
            .refresh_tokens(&first.refresh_token, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenPersist(_)));
        assert!(!err.is_refresh_failure());

        // Nothing changed: both sessions are still active
        let row = store
            .find_refresh_token_by_hash(&hash_refresh_token(&first.refresh_token))
            .await
            .unwrap()
            .unwrap();
        assert!(!row.revoked);
        assert_eq!(
            store
                .count_active_refresh_tokens(user.id, Utc::now())
                .await
                .unwrap(),
            2
        );

        // Retrying the same token is an ordinary rotation, not reuse
        store.fail_rotation.store(false, Ordering::SeqCst);
        let rotated = service
            .refresh_tokens(&first.refresh_token, &client())
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, first.refresh_token);
        assert!(service
            .refresh_tokens(&other.refresh_token, &client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_login_with_unreadable_hash_is_invalid_credentials() {
        let h = harness(false);
        let mut user = User::new("mallory", "mallory@example.com", "not-a-phc-string");
        user.verified = true;
        h.store.insert_user(&user).await.unwrap();

        let err = h
            .service
            .login(login_request("mallory", "correct horse battery"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(err.client_message(), "invalid email or password");
    }

    #[tokio::test]
    async fn test_refresh_unknown_and_expired() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;

        assert!(matches!(
            h.service.refresh_tokens("never-issued", &client()).await,
            Err(AuthError::InvalidRefreshToken)
        ));

        let now = Utc::now();
        let raw = h
            .service
            .issuer()
            .issue_refresh_token(user.id, now)
            .await
            .unwrap();
        let later = now + h.service.issuer().refresh_ttl() + chrono::Duration::seconds(1);
        assert!(matches!(
            h.service.refresh_tokens_at(&raw, later, &client()).await,
            Err(AuthError::RefreshTokenExpired)
        ));

        // Expiry is not reuse; the row stays unrevoked
        let row = h
            .store
            .find_refresh_token_by_hash(&hash_refresh_token(&raw))
            .await
            .unwrap()
            .unwrap();
        assert!(!row.revoked);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_current_roles() {
        let h = harness(false);
        let admin = h
            .service
            .create_account(
                register_request("root"),
                true,
                vec!["user".to_string(), "admin".to_string()],
            )
            .await
            .unwrap();
        let raw = h
            .service
            .issuer()
            .issue_refresh_token(admin.id, Utc::now())
            .await
            .unwrap();

        let pair = h.service.refresh_tokens(&raw, &client()).await.unwrap();
        let claims = h
            .service
            .issuer()
            .verify_access_token(&pair.access_token, Utc::now())
            .unwrap();
        assert!(claims.roles.contains(&"admin".to_string()));
    }

    #[tokio::test]
    async fn test_logout_revokes_presented_or_latest() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;
        let now = Utc::now();

        let a = h.service.issuer().issue_refresh_token(user.id, now).await.unwrap();
        let b = h
            .service
            .issuer()
            .issue_refresh_token(user.id, now + chrono::Duration::seconds(1))
            .await
            .unwrap();

        // Presented token is revoked
        let revoked = h
            .service
            .logout(&identity(&user), Some(&a), &client())
            .await
            .unwrap();
        assert_eq!(revoked, 1);
        assert!(h
            .store
            .find_refresh_token_by_hash(&hash_refresh_token(&a))
            .await
            .unwrap()
            .unwrap()
            .revoked);

        // Repeat is a no-op
        assert_eq!(
            h.service
                .logout(&identity(&user), Some(&a), &client())
                .await
                .unwrap(),
            0
        );

        // Without a cookie the newest active row goes
        assert_eq!(
            h.service
                .logout(&identity(&user), None, &client())
                .await
                .unwrap(),
            1
        );
        assert!(h
            .store
            .find_refresh_token_by_hash(&hash_refresh_token(&b))
            .await
            .unwrap()
            .unwrap()
            .revoked);
    }

    #[tokio::test]
    async fn test_logout_ignores_foreign_token() {
        let h = harness(false);
        let alice = verified_user(&h, "alice").await;
        let bob = verified_user(&h, "bob").await;

        let bobs = h
            .service
            .issuer()
            .issue_refresh_token(bob.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(
            h.service
                .logout(&identity(&alice), Some(&bobs), &client())
                .await
                .unwrap(),
            0
        );
        assert!(!h
            .store
            .find_refresh_token_by_hash(&hash_refresh_token(&bobs))
            .await
            .unwrap()
            .unwrap()
            .revoked);
    }

    #[tokio::test]
    async fn test_logout_all() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;
        for _ in 0..3 {
            h.service
                .issuer()
                .issue_refresh_token(user.id, Utc::now())
                .await
                .unwrap();
        }

        assert_eq!(
            h.service
                .logout_all(&identity(&user), &client())
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            h.store
                .count_active_refresh_tokens(user.id, Utc::now())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_single_winner() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;
        let raw = h
            .service
            .issuer()
            .issue_refresh_token(user.id, Utc::now())
            .await
            .unwrap();

        let service = Arc::new(h.service);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            let raw = raw.clone();
            handles.push(tokio::spawn(async move {
                service.refresh_tokens(&raw, &ClientInfo::default()).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(matches!(err, AuthError::RefreshTokenReused)),
            }
        }

        assert_eq!(successes, 1);
        assert!(
            h.store
                .count_active_refresh_tokens(user.id, Utc::now())
                .await
                .unwrap()
                <= 1
        );
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let h = harness(false);
        let user = verified_user(&h, "alice").await;
        let past = Utc::now() - chrono::Duration::days(3);
        h.service
            .issuer()
            .issue_refresh_token(user.id, past)
            .await
            .unwrap();
        h.service
            .issuer()
            .issue_refresh_token(user.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(h.service.prune_expired(Utc::now()).await.unwrap(), 1);
    }
}
