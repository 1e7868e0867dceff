//! Post handlers
//!
//! Listings go through the [`PostListCache`](crate::cache::PostListCache);
//! every write drops all cached listings.

use crate::auth::RequestIdentity;
use crate::error::{created, ok, AppError, FieldError};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use quill_core::{
    with_deadline, NewPost, Post, PostQuery, PostUpdate, SortOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Raw listing parameters shared by `/posts` and `/feed`
#[derive(Debug, Default, Deserialize)]
pub struct ListPostsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// `asc` or `desc` by creation time
    pub sort: Option<String>,
    /// Comma-separated; every tag must match
    pub tags: Option<String>,
    pub search: Option<String>,
    /// RFC 3339
    pub since: Option<String>,
    /// RFC 3339
    pub until: Option<String>,
    pub user_id: Option<Uuid>,
}

impl ListPostsParams {
    /// Parse into a normalized [`PostQuery`]
    pub fn into_query(self) -> Result<PostQuery, AppError> {
        let mut fields = Vec::new();

        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => SortOrder::default(),
            Some(s) if s.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            Some(s) if s.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            Some(_) => {
                fields.push(field_error("sort", "Sort must be 'asc' or 'desc'"));
                SortOrder::default()
            }
        };

        let since = parse_timestamp("since", self.since.as_deref(), &mut fields);
        let until = parse_timestamp("until", self.until.as_deref(), &mut fields);

        if !fields.is_empty() {
            return Err(AppError::Validation(fields));
        }

        let tags = self
            .tags
            .map(|tags| tags.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        Ok(PostQuery {
            limit: self.limit.unwrap_or(0),
            offset: self.offset.unwrap_or(0),
            sort,
            tags,
            search: self.search,
            since,
            until,
            author_id: self.user_id,
        }
        .normalized())
    }
}

fn parse_timestamp(
    field: &str,
    raw: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(_) => {
            errors.push(field_error(field, "Expected an RFC 3339 timestamp"));
            None
        }
    }
}

fn field_error(field: &str, message: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Create post request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Update post request; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, message = "Content must not be empty"))]
    pub content: Option<String>,

    pub tags: Option<Vec<String>>,
}

impl From<UpdatePostRequest> for PostUpdate {
    fn from(request: UpdatePostRequest) -> Self {
        Self {
            title: request.title,
            content: request.content,
            tags: request.tags,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}

/// Run a listing through the cache
pub(crate) async fn list_cached(
    state: &AppState,
    query: PostQuery,
) -> Result<Arc<Vec<Post>>, AppError> {
    if let Some(posts) = state.post_cache.get(&query).await {
        tracing::debug!("post listing served from cache");
        return Ok(posts);
    }

    let generation = state.post_cache.generation();
    let posts = Arc::new(
        with_deadline(state.store_timeout(), state.posts.list_posts(&query)).await?,
    );
    if !state.post_cache.put_if_current(&query, posts.clone(), generation).await {
        tracing::debug!("post listing not cached");
    }
    Ok(posts)
}

/// `GET /posts`
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListPostsParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let posts = list_cached(&state, params.into_query()?).await?;
    Ok(ok(posts.as_slice()))
}

/// `GET /posts/:id`
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let post = find_post(&state, id).await?;
    Ok(ok(post))
}

/// `POST /posts`; the author is the caller
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    let post = with_deadline(
        state.store_timeout(),
        state.posts.create_post(NewPost {
            title: request.title,
            content: request.content,
            tags: request.tags,
            author_id: identity.user_id,
        }),
    )
    .await?;
    state.post_cache.invalidate_all().await;

    tracing::info!(post_id = %post.id, author_id = %post.author_id, "post created");
    Ok(created(post))
}

/// `PUT /posts/:id`; author or admin
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    request.validate()?;

    let update = PostUpdate::from(request);
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let existing = find_post(&state, id).await?;
    ensure_can_modify(&identity, &existing)?;

    let post = with_deadline(state.store_timeout(), state.posts.update_post(id, &update))
        .await?
        .ok_or_else(|| AppError::NotFound("Post".to_string()))?;
    state.post_cache.invalidate_all().await;

    Ok(ok(post))
}

/// `DELETE /posts/:id`; author or admin
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;

    let existing = find_post(&state, id).await?;
    ensure_can_modify(&identity, &existing)?;

    let deleted = with_deadline(state.store_timeout(), state.posts.delete_post(id)).await?;
    if !deleted {
        return Err(AppError::NotFound("Post".to_string()));
    }
    state.post_cache.invalidate_all().await;

    tracing::info!(post_id = %id, user_id = %identity.user_id, "post deleted");
    Ok(ok(DeletedResponse { id, deleted }))
}

async fn find_post(state: &AppState, id: Uuid) -> Result<Post, AppError> {
    with_deadline(state.store_timeout(), state.posts.get_post(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Post".to_string()))
}

fn ensure_can_modify(identity: &RequestIdentity, post: &Post) -> Result<(), AppError> {
    if identity.can_modify(post.author_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the author or an admin may modify this post".to_string(),
        ))
    }
}
