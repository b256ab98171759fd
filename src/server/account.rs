//! Login, signup and logout. Outcomes are JSON; the session itself travels in
//! the session cookie.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::auth::{
    HOME_PATH, LOGIN_PATH, MaybeSession, clear_cookie_headers, read_cookie,
    session_cookie_headers, with_cookies,
};
use crate::backend::local::MIN_PASSWORD_LEN;
use crate::server::AppState;
use crate::server::dto::{AuthFormView, LoginRequest, LogoutView, SessionView, SignupRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_signup;
use crate::types::{AuthSession, Credentials};

const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(10);
const SIGNUP_PATH: &str = "/auth/signup";

pub async fn login_form() -> impl IntoResponse {
    Json(ApiResponse::success(AuthFormView {
        action: LOGIN_PATH,
        fields: vec!["email", "password"],
        alternate: SIGNUP_PATH,
        min_password_length: MIN_PASSWORD_LEN,
    }))
}

pub async fn signup_form() -> impl IntoResponse {
    Json(ApiResponse::success(AuthFormView {
        action: SIGNUP_PATH,
        fields: vec!["display_name", "email", "password", "confirm_password"],
        alternate: LOGIN_PATH,
        min_password_length: MIN_PASSWORD_LEN,
    }))
}

fn signed_in(
    state: &AppState,
    headers: &HeaderMap,
    session: &AuthSession,
    status: StatusCode,
) -> Response {
    let stale_chunks = read_cookie(headers, &state.config.session_cookie)
        .map(|raw| raw.chunks)
        .unwrap_or_default();
    let view = SessionView {
        user_id: session.user.id.clone(),
        email: session.user.email.clone(),
        expires_at: session.expires_at,
        redirect_to: HOME_PATH,
    };
    with_cookies(
        (status, Json(ApiResponse::success(view))).into_response(),
        session_cookie_headers(&state.config, session, stale_chunks),
    )
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let credentials = Credentials {
        email: req.email,
        password: req.password,
    };

    let session = tokio::time::timeout(SIGN_IN_TIMEOUT, state.backend.sign_in(&credentials))
        .await
        .map_err(|_| {
            tracing::warn!("sign in timed out");
            ApiError::timeout("Sign in timed out. Please try again.")
        })??;

    tracing::info!(user_id = %session.user.id, "signed in");
    Ok::<_, ApiError>(signed_in(&state, &headers, &session, StatusCode::OK))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SignupRequest>,
) -> impl IntoResponse {
    validate_signup(&req)?;

    let display_name = req.display_name.unwrap_or_default();
    let credentials = Credentials {
        email: req.email,
        password: req.password,
    };
    let session = state
        .backend
        .sign_up(&credentials, display_name.trim())
        .await?;

    tracing::info!(user_id = %session.user.id, "account created");
    Ok::<_, ApiError>(signed_in(&state, &headers, &session, StatusCode::CREATED))
}

/// Ends the session with the auth service and clears the cookie. A failure
/// to revoke the token still signs the browser out.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(session) = session {
        match state.backend.sign_out(&session.access_token).await {
            Ok(()) => tracing::info!(user_id = %session.user.id, "signed out"),
            Err(e) => tracing::warn!(user_id = %session.user.id, "sign out failed: {e}"),
        }
    }

    let chunks = read_cookie(&headers, &state.config.session_cookie)
        .map(|raw| raw.chunks)
        .unwrap_or_default();
    with_cookies(
        Json(ApiResponse::success(LogoutView {
            redirect_to: LOGIN_PATH,
        }))
        .into_response(),
        clear_cookie_headers(&state.config, chunks),
    )
}
