/// Authentication and authorization middleware
///
/// `authenticate` turns a bearer token into a [`RequestIdentity`] in the
/// request extensions. `require_roles` gates a route on a fixed role set and
/// must be layered inside `authenticate`.
use super::error::AuthError;
use super::issuer::TokenIssuer;
use super::models::RequestIdentity;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;

/// Pull the bearer token out of `Authorization`.
///
/// No header, or a non-bearer scheme, means no token was presented.
/// A bearer header that is empty or not visible ASCII is malformed.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(AuthError::MissingToken);
    };
    let value = value.to_str().map_err(|_| AuthError::TokenInvalid)?;

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::TokenInvalid);
    }
    Ok(token)
}

/// Authentication middleware that requires a valid access token
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(issuer, authenticate));
/// ```
pub async fn authenticate(
    State(issuer): State<Arc<TokenIssuer>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let verified = bearer_token(request.headers())
        .and_then(|token| issuer.verify_access_token(token, Utc::now()));

    let claims = match verified {
        Ok(claims) => claims,
        Err(err) => {
            if !matches!(err, AuthError::MissingToken) {
                audit_log(&AuditEvent::InvalidToken {
                    reason: err.to_string(),
                    ip_address: extract_ip_address(request.headers()),
                    user_agent: extract_user_agent(request.headers()),
                });
            }
            return Err(err);
        }
    };

    // `verify_access_token` has already checked the subject parses
    let user_id = claims.user_id().map_err(|_| AuthError::TokenInvalid)?;

    request.extensions_mut().insert(RequestIdentity {
        user_id,
        roles: claims.roles,
    });

    Ok(next.run(request).await)
}

/// Pure role check: pass when the identity holds any of `required`.
///
/// No role implies another; `admin` only passes where it is listed.
pub fn authorize(
    identity: Option<&RequestIdentity>,
    required: &[&str],
) -> Result<(), AuthError> {
    let identity = identity.ok_or(AuthError::MissingIdentity)?;

    if identity
        .roles
        .iter()
        .any(|role| required.contains(&role.as_str()))
    {
        Ok(())
    } else {
        Err(AuthError::AccessDenied)
    }
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>;

/// Middleware factory requiring any of `required_roles`
///
/// ```ignore
/// let admin = Router::new()
///     .route("/users", get(list_users))
///     .route_layer(middleware::from_fn(require_roles(&["admin"])))
///     .route_layer(middleware::from_fn_with_state(issuer, authenticate));
/// ```
pub fn require_roles(
    required_roles: &'static [&'static str],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let identity = request.extensions().get::<RequestIdentity>();

            if let Err(err) = authorize(identity, required_roles) {
                if matches!(err, AuthError::AccessDenied) {
                    audit_log(&AuditEvent::AccessDenied {
                        user_id: identity.map(|i| i.user_id),
                        resource: request.uri().path().to_string(),
                        required_roles: required_roles.iter().map(|r| r.to_string()).collect(),
                        ip_address: extract_ip_address(request.headers()),
                    });
                }
                return Err(err);
            }

            Ok(next.run(request).await)
        })
    }
}
