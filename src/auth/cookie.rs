use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::types::AuthSession;

const BASE64_PREFIX: &str = "base64-";
// Matches the auth helpers' default lifetime; the tokens inside expire sooner.
const COOKIE_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// Tokens carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds. Unknown expiry means "ask the backend".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl SessionCookie {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now.timestamp())
    }

    /// `base64-` followed by the URL-safe encoded JSON payload.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json))
    }

    /// Accepts the `base64-` form and raw (optionally percent-encoded) JSON.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(encoded) = value.strip_prefix(BASE64_PREFIX) {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded)
                .or_else(|_| URL_SAFE.decode(encoded))
                .or_else(|_| STANDARD.decode(encoded))
                .ok()?;
            return serde_json::from_slice(&bytes).ok();
        }

        let json = urlencoding::decode(value).ok()?;
        serde_json::from_str(&json).ok()
    }
}

impl From<&AuthSession> for SessionCookie {
    fn from(session: &AuthSession) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: Some(session.expires_at.timestamp()),
        }
    }
}

/// Cookie value as sent by the browser. Large sessions arrive split across
/// `name.0`, `name.1`, ... and are joined here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCookie {
    pub value: String,
    /// Number of `name.N` chunks it was assembled from; 0 for a plain cookie.
    pub chunks: usize,
}

#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<RawCookie> {
    let pairs: Vec<(&str, &str)> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .collect();

    let lookup = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
    };

    if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
        return Some(RawCookie { value, chunks: 0 });
    }

    let mut value = String::new();
    let mut chunks = 0;
    while let Some(chunk) = lookup(&format!("{name}.{chunks}")) {
        value.push_str(&chunk);
        chunks += 1;
    }
    (chunks > 0).then_some(RawCookie { value, chunks })
}

fn cookie_header(config: &ServerConfig, name: &str, value: &str, max_age: i64) -> Option<HeaderValue> {
    let secure = if config.secure_cookies { "; Secure" } else { "" };
    let header = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}");
    match HeaderValue::from_str(&header) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(cookie = name, "invalid session cookie header: {e}");
            None
        }
    }
}

/// `Set-Cookie` values storing `session`, expiring stale chunks from an
/// earlier split cookie.
#[must_use]
pub fn session_cookie_headers(
    config: &ServerConfig,
    session: &AuthSession,
    stale_chunks: usize,
) -> Vec<HeaderValue> {
    let name = &config.session_cookie;
    let value = SessionCookie::from(session).encode();
    let mut headers: Vec<_> = cookie_header(config, name, &value, COOKIE_MAX_AGE_SECS)
        .into_iter()
        .collect();
    headers.extend(
        (0..stale_chunks).filter_map(|i| cookie_header(config, &format!("{name}.{i}"), "", 0)),
    );
    headers
}

/// `Set-Cookie` values that remove the session cookie and any chunks.
#[must_use]
pub fn clear_cookie_headers(config: &ServerConfig, chunks: usize) -> Vec<HeaderValue> {
    let name = &config.session_cookie;
    let mut headers: Vec<_> = cookie_header(config, name, "", 0).into_iter().collect();
    headers.extend((0..chunks).filter_map(|i| cookie_header(config, &format!("{name}.{i}"), "", 0)));
    headers
}

/// Appends `Set-Cookie` headers without replacing any already set.
#[must_use]
pub fn with_cookies(mut response: Response, cookies: Vec<HeaderValue>) -> Response {
    for cookie in cookies {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthUser;

    fn session() -> AuthSession {
        AuthSession {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            user: AuthUser {
                id: "u1".into(),
                email: None,
            },
        }
    }

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_encode_decode() {
        let cookie = SessionCookie::from(&session());
        let encoded = cookie.encode();

        assert!(encoded.starts_with("base64-"));
        assert_eq!(SessionCookie::decode(&encoded), Some(cookie));
    }

    #[test]
    fn test_decode_raw_and_percent_encoded_json() {
        let raw = r#"{"access_token":"a","refresh_token":"r","expires_at":5,"token_type":"bearer"}"#;
        let cookie = SessionCookie::decode(raw).unwrap();
        assert_eq!(cookie.access_token, "a");
        assert_eq!(cookie.expires_at, Some(5));

        let escaped = urlencoding::encode(raw);
        assert_eq!(SessionCookie::decode(&escaped), Some(cookie));

        assert!(SessionCookie::decode("base64-!!!").is_none());
        assert!(SessionCookie::decode("garbage").is_none());
    }

    #[test]
    fn test_expiry() {
        let now = DateTime::from_timestamp(100, 0).unwrap();
        let mut cookie = SessionCookie {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Some(100),
        };
        assert!(cookie.is_expired(now));

        cookie.expires_at = Some(101);
        assert!(!cookie.is_expired(now));

        cookie.expires_at = None;
        assert!(!cookie.is_expired(now));
    }

    #[test]
    fn test_read_plain_and_chunked_cookies() {
        let plain = read_cookie(&headers("theme=dark; sb-auth-token=abc"), "sb-auth-token");
        assert_eq!(
            plain,
            Some(RawCookie {
                value: "abc".into(),
                chunks: 0
            })
        );

        let chunked = read_cookie(
            &headers("sb-auth-token.1=def; sb-auth-token.0=abc; other=1"),
            "sb-auth-token",
        );
        assert_eq!(
            chunked,
            Some(RawCookie {
                value: "abcdef".into(),
                chunks: 2
            })
        );

        assert!(read_cookie(&headers("other=1"), "sb-auth-token").is_none());
        assert!(read_cookie(&HeaderMap::new(), "sb-auth-token").is_none());
    }

    #[test]
    fn test_set_cookie_headers() {
        let mut config = ServerConfig::default();
        config.secure_cookies = true;

        let headers = session_cookie_headers(&config, &session(), 2);
        assert_eq!(headers.len(), 3);
        let first = headers[0].to_str().unwrap();
        assert!(first.starts_with("sb-auth-token=base64-"));
        assert!(first.contains("HttpOnly"));
        assert!(first.ends_with("; Secure"));
        assert!(headers[2].to_str().unwrap().starts_with("sb-auth-token.1=;"));

        let cleared = clear_cookie_headers(&ServerConfig::default(), 0);
        assert_eq!(cleared.len(), 1);
        assert!(cleared[0].to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn test_with_cookies_keeps_existing_set_cookie() {
        let mut response = Response::new(axum::body::Body::empty());
        response
            .headers_mut()
            .insert(SET_COOKIE, HeaderValue::from_static("theme=dark"));

        let response = with_cookies(
            response,
            vec![
                HeaderValue::from_static("sb-auth-token=a"),
                HeaderValue::from_static("sb-auth-token.0="),
            ],
        );
        let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0], "theme=dark");
        assert_eq!(cookies[2], "sb-auth-token.0=");
    }
}
