//! Personal feed

use super::posts::{list_cached, ListPostsParams};
use crate::auth::RequestIdentity;
use crate::error::{ok, AppError};
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Response,
};
use std::sync::Arc;

/// `GET /feed`: the caller's own posts, filtered like `/posts`.
/// A `user_id` parameter is ignored.
pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    params: Result<Query<ListPostsParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;

    let mut query = params.into_query()?;
    query.author_id = Some(identity.user_id);

    let posts = list_cached(&state, query).await?;
    Ok(ok(posts.as_slice()))
}
