//! Security audit logging for authentication events
//!
//! Events are emitted at INFO (WARN for reuse detection) under the `audit`
//! target so they can be routed separately from application logs. Secrets,
//! password hashes and token values never appear in an event.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// `reason` is internal only; clients always see the same message
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationSuccess {
        user_id: Uuid,
        username: String,
        ip_address: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
    },

    Logout {
        user_id: Uuid,
        all_devices: bool,
        revoked: u64,
        ip_address: Option<String>,
    },

    TokenRefresh {
        user_id: Uuid,
        ip_address: Option<String>,
    },

    RefreshFailure {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// A revoked refresh token was presented; every session of the owner
    /// has been revoked
    RefreshTokenReuse { user_id: Uuid, revoked_count: u64 },

    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    AccessDenied {
        user_id: Option<Uuid>,
        resource: String,
        required_roles: Vec<String>,
        ip_address: Option<String>,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "login_success",
            AuditEvent::LoginFailure { .. } => "login_failure",
            AuditEvent::RegistrationSuccess { .. } => "registration_success",
            AuditEvent::RegistrationFailure { .. } => "registration_failure",
            AuditEvent::Logout { .. } => "logout",
            AuditEvent::TokenRefresh { .. } => "token_refresh",
            AuditEvent::RefreshFailure { .. } => "refresh_failure",
            AuditEvent::RefreshTokenReuse { .. } => "refresh_token_reuse",
            AuditEvent::InvalidToken { .. } => "invalid_token",
            AuditEvent::AccessDenied { .. } => "access_denied",
        }
    }
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::RefreshTokenReuse {
            user_id,
            revoked_count,
        } => {
            warn!(
                target: "audit",
                event_type = event.name(),
                event = %event_json,
                user_id = %user_id,
                revoked_count = revoked_count,
                "Refresh token reuse detected, all sessions revoked"
            );
        }
        AuditEvent::LoginFailure { reason, .. } | AuditEvent::RegistrationFailure { reason, .. } => {
            info!(
                target: "audit",
                event_type = event.name(),
                event = %event_json,
                reason = %reason,
                "Authentication attempt rejected"
            );
        }
        _ => {
            info!(
                target: "audit",
                event_type = event.name(),
                event = %event_json,
                "Security event"
            );
        }
    }
}

/// Client metadata attached to audit events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Client IP from X-Forwarded-For (first hop) or X-Real-IP
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(first_ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
