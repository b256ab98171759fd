use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::IntoResponse,
};

use crate::server::AppState;
use crate::server::response::{ApiError, BackendOptionExt};
use crate::upload::guess_image_type;

const OCTET_STREAM: &str = "application/octet-stream";
const SVG: &str = "image/svg+xml";

/// Objects are uploaded by any signed-in user and served on the app's own
/// origin, so nothing they contain may run as script here.
fn object_headers(content_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; sandbox"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    if content_type == SVG {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment"),
        );
    }
    headers
}

/// Serves bucket objects at the URLs the local backend hands out. Keys are
/// write-once, so responses cache forever.
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> impl IntoResponse {
    if bucket != state.bucket {
        return Err(ApiError::not_found("Object not found"));
    }

    let data = state
        .backend
        .download_object(&key)
        .await?
        .or_not_found("Object not found")?;
    let content_type = guess_image_type(&key).unwrap_or(OCTET_STREAM);

    Ok::<_, ApiError>((object_headers(content_type), data))
}
