//! Authentication API handlers
//!
//! The access token travels in the JSON body; the refresh secret only ever
//! travels in the `refresh_token` cookie.

use crate::audit::ClientInfo;
use crate::auth::{
    refresh_token_from, AuthError, LoginRequest, LogoutQuery, RegisterRequest, RequestIdentity,
    TokenPair, TokenResponse,
};
use crate::error::{created, ok, AppError};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Logout response
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
    /// Refresh tokens revoked by this call
    pub revoked: u64,
}

/// Register a new account
///
/// * `201 Created` - public user
/// * `409 Conflict` - email or username already in use
/// * `422 Unprocessable Entity` - field validation failed
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let client = ClientInfo::from_headers(&headers);

    let user = state.sessions.register(request, &client).await?;

    Ok(created(user.to_public()))
}

/// Login with email and password
///
/// Returns the access token and sets the refresh cookie. Every credential
/// failure is the same `401 INVALID_CREDENTIALS`.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let client = ClientInfo::from_headers(&headers);

    let (_, pair) = state.sessions.login(request, &client).await?;

    with_refresh_cookie(&state, &pair)
}

/// Rotate the refresh cookie and mint a new access token
///
/// Any refresh failure answers `401 INVALID_REFRESH_TOKEN` and clears the
/// cookie.
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let client = ClientInfo::from_headers(&headers);

    let result = match refresh_token_from(&headers) {
        Some(raw) => state.sessions.refresh_tokens(&raw, &client).await,
        None => Err(AuthError::InvalidRefreshToken),
    };

    match result {
        Ok(pair) => with_refresh_cookie(&state, &pair),
        Err(err) if err.is_refresh_failure() => {
            let mut response = err.into_response();
            response
                .headers_mut()
                .insert(header::SET_COOKIE, state.refresh_cookie().clear());
            Ok(response)
        }
        Err(err) => Err(err.into()),
    }
}

/// Logout the current session, or every session with `?all=true`
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    headers: HeaderMap,
    query: Result<Query<LogoutQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let client = ClientInfo::from_headers(&headers);

    let revoked = if query.all {
        state.sessions.logout_all(&identity, &client).await?
    } else {
        let presented = refresh_token_from(&headers);
        state
            .sessions
            .logout(&identity, presented.as_deref(), &client)
            .await?
    };

    let mut response = ok(LogoutResponse {
        message: "Logged out successfully".to_string(),
        revoked,
    });
    response
        .headers_mut()
        .insert(header::SET_COOKIE, state.refresh_cookie().clear());
    Ok(response)
}

/// Current user profile
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
) -> Result<Response, AppError> {
    let user = state
        .sessions
        .current_user(&identity)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    Ok(ok(user.to_public()))
}

fn with_refresh_cookie(state: &AppState, pair: &TokenPair) -> Result<Response, AppError> {
    let cookie = state
        .refresh_cookie()
        .issue(&pair.refresh_token, Utc::now())
        .map_err(|err| AppError::Internal(format!("refresh cookie: {err}")))?;

    let mut response = ok(TokenResponse::from(pair));
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}
