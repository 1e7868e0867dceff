//! API route definitions

use crate::auth::{authenticate, require_roles};
use crate::handlers::{auth, feed, health, posts, users};
use crate::state::AppState;
use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use quill_core::config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Level;

/// Roles allowed to publish posts
const WRITERS: &[&str] = &["user", "admin"];
const ADMINS: &[&str] = &["admin"];

/// Create API v1 routes
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/posts", get(posts::list_posts))
        .route("/posts/:id", get(posts::get_post));

    let admin_routes = Router::new()
        .route("/users", get(users::list_users))
        .route_layer(middleware::from_fn(require_roles(ADMINS)));

    let writer_routes = Router::new()
        .route("/posts", post(posts::create_post))
        .route_layer(middleware::from_fn(require_roles(WRITERS)));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/users/:id", get(users::get_user))
        .route(
            "/posts/:id",
            axum::routing::put(posts::update_post).delete(posts::delete_post),
        )
        .route("/feed", get(feed::feed_handler))
        .merge(admin_routes)
        .merge(writer_routes)
        .route_layer(middleware::from_fn_with_state(
            state.issuer.clone(),
            authenticate,
        ));

    // Combine routes
    Router::new().merge(public_routes).merge(protected_routes)
}

/// Liveness and readiness probes
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
}

/// Full application router with the HTTP middleware stack
pub fn app_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let timeout = Duration::from_secs(server.request_timeout_secs);
    let cors = cors_layer(server);

    Router::new()
        .merge(health_routes())
        .nest("/api/v1", api_routes(&state))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// CORS for the configured browser origins.
///
/// The refresh cookie needs credentialed requests, so origins are listed
/// explicitly; with none configured no cross-origin request is allowed.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
