use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;

use super::cookie::{
    SessionCookie, clear_cookie_headers, read_cookie, session_cookie_headers, with_cookies,
};
use super::session::Session;
use crate::server::AppState;

pub const LOGIN_PATH: &str = "/auth/login";
pub const HOME_PATH: &str = "/";

const EXEMPT_PREFIXES: &[&str] = &["/storage/"];
const EXEMPT_PATHS: &[&str] = &["/health", "/favicon.ico"];
const IMAGE_EXTENSIONS: &[&str] = &["svg", "png", "jpg", "jpeg", "gif", "webp"];

/// Paths served without looking at the session at all.
#[must_use]
pub fn is_exempt_path(path: &str) -> bool {
    if EXEMPT_PATHS.contains(&path) || EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[must_use]
pub fn is_auth_path(path: &str) -> bool {
    path == "/auth" || path.starts_with("/auth/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    ToLogin,
    ToHome,
}

#[must_use]
pub fn decide(path: &str, has_session: bool) -> GateDecision {
    match (has_session, is_auth_path(path)) {
        (false, false) => GateDecision::ToLogin,
        (true, true) => GateDecision::ToHome,
        _ => GateDecision::Pass,
    }
}

/// Outcome of reading the session cookie, plus any cookie updates the
/// response must carry.
struct Resolved {
    session: Option<Session>,
    set_cookies: Vec<HeaderValue>,
}

impl Resolved {
    fn anonymous(set_cookies: Vec<HeaderValue>) -> Self {
        Self {
            session: None,
            set_cookies,
        }
    }
}

/// Resolves the session. Any failure leaves the request anonymous.
async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Resolved {
    let config = &state.config;
    let Some(raw) = read_cookie(headers, &config.session_cookie) else {
        return Resolved::anonymous(Vec::new());
    };
    let Some(mut cookie) = SessionCookie::decode(&raw.value) else {
        tracing::debug!("unreadable session cookie");
        return Resolved::anonymous(clear_cookie_headers(config, raw.chunks));
    };

    let mut set_cookies = Vec::new();
    if cookie.is_expired(Utc::now()) {
        match state.backend.refresh_session(&cookie.refresh_token).await {
            Ok(session) => {
                tracing::debug!(user_id = %session.user.id, "session refreshed");
                set_cookies = session_cookie_headers(config, &session, raw.chunks);
                cookie = SessionCookie::from(&session);
            }
            Err(e) if e.is_rejection() => {
                tracing::debug!("session refresh rejected: {e}");
                return Resolved::anonymous(clear_cookie_headers(config, raw.chunks));
            }
            Err(e) => {
                tracing::warn!("session refresh failed: {e}");
                return Resolved::anonymous(Vec::new());
            }
        }
    }

    match state.backend.get_user(&cookie.access_token).await {
        Ok(Some(user)) => Resolved {
            session: Some(Session {
                user,
                access_token: cookie.access_token,
            }),
            set_cookies,
        },
        Ok(None) => {
            tracing::debug!("session token not recognised");
            Resolved::anonymous(clear_cookie_headers(config, raw.chunks))
        }
        Err(e) => {
            tracing::warn!("session lookup failed, treating request as signed out: {e}");
            Resolved::anonymous(set_cookies)
        }
    }
}

/// Redirects signed-out requests to the login page and signed-in requests
/// away from it. Refreshed session cookies ride along on every response,
/// redirects included.
pub async fn session_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_exempt_path(&path) {
        return next.run(request).await;
    }

    let resolved = resolve_session(&state, request.headers()).await;
    let decision = decide(&path, resolved.session.is_some());
    tracing::debug!(path, ?decision, "session gate");

    match decision {
        GateDecision::ToLogin => {
            with_cookies(Redirect::temporary(LOGIN_PATH).into_response(), resolved.set_cookies)
        }
        GateDecision::ToHome => {
            with_cookies(Redirect::temporary(HOME_PATH).into_response(), resolved.set_cookies)
        }
        GateDecision::Pass => {
            if let Some(session) = resolved.session {
                request.extensions_mut().insert(session);
            }
            with_cookies(next.run(request).await, resolved.set_cookies)
        }
    }
}
