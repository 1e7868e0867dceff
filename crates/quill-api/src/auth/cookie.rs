//! Refresh-token cookie helpers
//!
//! The refresh secret only ever travels in an `HttpOnly`, `SameSite=Strict`
//! cookie scoped to `/`. `Secure` is on unless explicitly disabled for plain
//! HTTP development setups.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Settings shared by every refresh cookie the server writes
#[derive(Debug, Clone, Copy)]
pub struct RefreshCookie {
    pub secure: bool,
    pub max_age: chrono::Duration,
}

impl RefreshCookie {
    /// `Set-Cookie` value carrying a freshly issued refresh secret
    pub fn issue(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<HeaderValue, header::InvalidHeaderValue> {
        let expires = (now + self.max_age).format(EXPIRES_FORMAT);
        HeaderValue::from_str(&format!(
            "{REFRESH_COOKIE_NAME}={secret}; Max-Age={}; Expires={expires}; {}",
            self.max_age.num_seconds().max(0),
            self.attributes()
        ))
    }

    /// `Set-Cookie` value that makes the browser drop the refresh cookie
    pub fn clear(&self) -> HeaderValue {
        let value = format!(
            "{REFRESH_COOKIE_NAME}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; {}",
            self.attributes()
        );
        // Only static ASCII goes into this value
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    fn attributes(&self) -> &'static str {
        if self.secure {
            "HttpOnly; Secure; SameSite=Strict; Path=/"
        } else {
            "HttpOnly; SameSite=Strict; Path=/"
        }
    }
}

/// Read a cookie value from the request's `Cookie` headers
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// The presented refresh secret, if any
pub fn refresh_token_from(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, REFRESH_COOKIE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cookie(secure: bool) -> RefreshCookie {
        RefreshCookie {
            secure,
            max_age: chrono::Duration::days(1),
        }
    }

    #[test]
    fn test_issue_attributes() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let value = cookie(true).issue("abc-_123", now).unwrap();
        let value = value.to_str().unwrap();

        assert!(value.starts_with("refresh_token=abc-_123;"));
        assert!(value.contains("Max-Age=86400"));
        assert!(value.contains("Expires=Sat, 02 Mar 2024 12:00:00 GMT"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Path=/"));
    }

    #[test]
    fn test_insecure_mode_drops_secure_only() {
        let value = cookie(false).issue("abc", Utc::now()).unwrap();
        let value = value.to_str().unwrap();
        assert!(!value.contains("Secure"));
        assert!(value.contains("HttpOnly"));
    }

    #[test]
    fn test_clear() {
        let value = cookie(true).clear();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("refresh_token=;"));
        assert!(value.contains("Max-Age=0"));
    }

    #[test]
    fn test_parse_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; refresh_token=s3cr3t; other=1".parse().unwrap(),
        );
        assert_eq!(refresh_token_from(&headers), Some("s3cr3t".to_string()));
        assert_eq!(parse_cookie(&headers, "missing"), None);

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, "refresh_token=".parse().unwrap());
        assert_eq!(refresh_token_from(&empty), None);
    }
}
