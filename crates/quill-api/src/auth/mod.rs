//! Authentication and authorization module
//!
//! - Argon2id password hashing
//! - HS256 access tokens and opaque, rotated refresh tokens
//! - Session service (register, login, logout, refresh with reuse detection)
//! - Bearer authentication and role authorization middleware
//! - Refresh cookie helpers

pub mod cookie;
pub mod error;
pub mod issuer;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod refresh;
pub mod service;

pub use cookie::{refresh_token_from, RefreshCookie, REFRESH_COOKIE_NAME};
pub use error::AuthError;
pub use issuer::TokenIssuer;
pub use jwt::{Claims, JwtKeys};
pub use middleware::{authenticate, authorize, require_roles};
pub use models::{
    LoginRequest, LogoutQuery, RegisterRequest, RequestIdentity, TokenPair, TokenResponse,
};
pub use password::{hash_password, verify_password, PasswordConfig};
pub use refresh::{generate_refresh_secret, hash_refresh_token};
pub use service::SessionService;
