//! Quill API - REST server
//!
//! Provides HTTP endpoints for accounts, sessions, posts and the personal
//! feed. Access tokens are short-lived JWTs; refresh tokens are opaque,
//! rotated on every use and stored only as digests.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Build the application router over prepared state
pub fn create_router(state: Arc<AppState>) -> Router {
    routes::app_router(state)
}

/// Configuration used by tests: development secret, verified sign-ups
#[cfg(any(test, feature = "test-utils"))]
pub fn test_config() -> quill_core::AppConfig {
    let mut config = quill_core::AppConfig::default();
    config.server.development = true;
    config.auth.jwt_secret = quill_core::config::DEVELOPMENT_SECRET.to_string();
    config.auth.auto_verify = true;
    config
}

/// In-memory state for tests
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> Arc<AppState> {
    create_test_state_with(test_config())
}

#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state_with(config: quill_core::AppConfig) -> Arc<AppState> {
    Arc::new(AppState::in_memory(config).expect("test state"))
}

/// Router over a fresh in-memory store
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(create_test_state())
}
