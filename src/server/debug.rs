//! Admin-only data tools: the orphan sweep, single-photo repair, and a view
//! of where photo files actually live in the bucket.

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireAdmin;
use crate::backend::{
    ObjectQuery, PhotoFilter, PhotoSource, classify_photo, display_url, find_photo_key,
};
use crate::server::AppState;
use crate::server::dto::{DebugPhotosView, PhotoProbe, RepairView};
use crate::server::response::{ApiError, ApiResponse, or_empty};
use crate::sweep::{repair_one, sweep};
use crate::types::Photo;

const PROBED_PHOTOS: usize = 10;
const LISTED_OBJECTS: usize = 100;

pub async fn sweep_report(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let report = sweep(state.backend.as_ref()).await;
    Ok::<_, ApiError>(Json(ApiResponse::success(report)))
}

pub async fn repair(admin: RequireAdmin, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!(user_id = %admin.profile.id, "manual repair started");
    let log = repair_one(state.backend.as_ref()).await;
    Ok::<_, ApiError>(Json(ApiResponse::success(RepairView::from(log))))
}

fn source_label(source: PhotoSource<'_>) -> &'static str {
    match source {
        PhotoSource::Missing => "missing",
        PhotoSource::MobileOnly => "mobile_only",
        PhotoSource::Remote(_) => "remote",
        PhotoSource::Inline(_) => "inline",
        PhotoSource::DevicePath => "device_path",
        PhotoSource::StorageKey(_) => "storage_key",
    }
}

async fn probe(state: &AppState, photo: Photo) -> PhotoProbe {
    let backend = state.backend.as_ref();
    let source = classify_photo(&photo.file_name, photo.local_uri.as_deref());
    let found_key = match source {
        PhotoSource::StorageKey(key) => {
            find_photo_key(backend, key, photo.user_id.as_deref()).await
        }
        _ => None,
    };

    PhotoProbe {
        source: source_label(source),
        display_url: display_url(backend, &photo),
        found_url: found_key.as_deref().map(|key| backend.public_url(key)),
        found_key,
        id: photo.id,
        file_name: photo.file_name,
    }
}

pub async fn debug_photos(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let photo_filter = PhotoFilter::all().with_limit(PROBED_PHOTOS);
    let object_query = ObjectQuery::default();
    let (photos, objects) = futures::join!(
        backend.list_photos(&photo_filter),
        backend.list_objects(&object_query),
    );

    let mut probes = Vec::new();
    for photo in or_empty(photos, "recent photos") {
        probes.push(probe(&state, photo).await);
    }

    let (objects, storage_error) = match objects {
        Ok(mut objects) => {
            objects.truncate(LISTED_OBJECTS);
            (objects, None)
        }
        Err(e) => {
            tracing::warn!("bucket listing failed: {e}");
            (Vec::new(), Some(e.to_string()))
        }
    };

    let view = DebugPhotosView {
        photos: probes,
        objects,
        storage_error,
    };
    Ok::<_, ApiError>(Json(ApiResponse::success(view)))
}
