//! User directory handlers

use crate::auth::RequestIdentity;
use crate::error::{ok, AppError};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Response,
};
use quill_core::{with_deadline, UserPublic};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Paging for `GET /users`
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListUsersQuery {
    fn bounds(&self) -> (i64, i64) {
        let limit = match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

/// List accounts (admin only, enforced by the route layer)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let (limit, offset) = query.bounds();

    let users = with_deadline(
        state.store_timeout(),
        state.credentials.list_users(limit, offset),
    )
    .await?;

    let users: Vec<UserPublic> = users.iter().map(|u| u.to_public()).collect();
    Ok(ok(users))
}

/// Public profile of one account
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _identity: RequestIdentity,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;

    let user = with_deadline(state.store_timeout(), state.credentials.find_user_by_id(id))
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    Ok(ok(user.to_public()))
}
