//! Application state shared across handlers

use quill_core::{AppConfig, CredentialStore, MemoryStore, PgStore, PostRepository};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{AuthError, PasswordConfig, RefreshCookie, SessionService, TokenIssuer};
use crate::cache::PostListCache;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Accounts and refresh tokens
    pub credentials: Arc<dyn CredentialStore>,
    /// Posts
    pub posts: Arc<dyn PostRepository>,
    pub issuer: Arc<TokenIssuer>,
    pub sessions: Arc<SessionService>,
    pub post_cache: PostListCache,
}

impl AppState {
    /// Wire services over the given stores
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        posts: Arc<dyn PostRepository>,
        password: PasswordConfig,
    ) -> Result<Self, AuthError> {
        let store_timeout = config.database.store_timeout();
        let issuer = Arc::new(TokenIssuer::new(
            &config.auth,
            credentials.clone(),
            store_timeout,
        ));
        let sessions = Arc::new(SessionService::new(
            credentials.clone(),
            issuer.clone(),
            password,
            store_timeout,
            config.auth.auto_verify,
        )?);
        let post_cache = PostListCache::new(&config.cache);

        Ok(Self {
            config,
            start_time: Instant::now(),
            credentials,
            posts,
            issuer,
            sessions,
            post_cache,
        })
    }

    /// PostgreSQL-backed state
    pub fn with_postgres(config: AppConfig, store: PgStore) -> Result<Self, AuthError> {
        let store = Arc::new(store);
        Self::new(config, store.clone(), store, PasswordConfig::default())
    }

    /// Process-local state for tests and local runs
    pub fn in_memory(config: AppConfig) -> Result<Self, AuthError> {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store, PasswordConfig::fast_insecure())
    }

    pub fn store_timeout(&self) -> Duration {
        self.config.database.store_timeout()
    }

    pub fn refresh_cookie(&self) -> RefreshCookie {
        RefreshCookie {
            secure: self.config.auth.refresh_cookie_secure,
            max_age: self.issuer.refresh_ttl(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
