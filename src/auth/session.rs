use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::server::AppState;
use crate::types::{AuthUser, UserProfile};

/// The signed-in user for the current request, placed in request
/// extensions by the session gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: String,
}

/// Extractor that requires a session
pub struct RequireSession(pub Session);

/// Extractor for routes that behave differently with and without a session
pub struct MaybeSession(pub Option<Session>);

/// Extractor that requires an admin profile
pub struct RequireAdmin {
    pub session: Session,
    pub profile: UserProfile,
}

#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    NotAdmin,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSession => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });
        (status, Json(body)).into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(RequireSession)
            .ok_or(AuthError::MissingSession)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(parts.extensions.get::<Session>().cloned()))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireSession(session) = RequireSession::from_request_parts(parts, state).await?;

        let profile = state
            .backend
            .get_profile(&session.user.id)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %session.user.id, "profile lookup failed: {e}");
                AuthError::InternalError
            })?
            .ok_or(AuthError::NotAdmin)?;

        if !profile.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin { session, profile })
    }
}
