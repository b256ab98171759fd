use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Query, State, multipart::Field},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};

use crate::auth::RequireSession;
use crate::backend::{PhotoChange, ProjectFilter};
use crate::server::AppState;
use crate::server::dto::{ListPhotosParams, PhotoFilterView, PhotoListView, PhotoView};
use crate::server::response::{ApiError, ApiResponse, or_empty};
use crate::server::validation::{coordinate, photo_filter, selected};
use crate::upload::{UploadBatch, UploadTarget};

pub async fn list_photos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPhotosParams>,
) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let filter = photo_filter(&params);

    let project_filter = ProjectFilter::default();
    let (photos, sites, projects) = futures::join!(
        backend.list_photos(&filter),
        backend.list_sites(),
        backend.list_projects(&project_filter),
    );

    let mut projects = or_empty(projects, "projects");
    projects.sort_by(|a, b| a.name.cmp(&b.name));

    let view = PhotoListView {
        photos: PhotoView::list(backend, or_empty(photos, "photos")),
        filter: PhotoFilterView {
            site_id: filter.site_id.unwrap_or_else(|| "all".to_string()),
            project_id: filter.project_id.unwrap_or_else(|| "all".to_string()),
        },
        sites: or_empty(sites, "sites"),
        projects,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(view)))
}

async fn text_field(field: Field<'_>) -> Result<Option<String>, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form field: {e}")))?;
    Ok(selected(Some(&text)))
}

/// Multipart fields: `file` (repeatable), `site_id`, `project_id`, and
/// optional `latitude`, `longitude`, `address` overrides.
pub async fn upload_photos(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut batch = UploadBatch::new();
    let mut target = UploadTarget {
        user_id: Some(session.user.id.clone()),
        ..UploadTarget::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
                batch.add(&file_name, content_type.as_deref(), data);
            }
            "site_id" => target.site_id = text_field(field).await?,
            "project_id" => target.project_id = text_field(field).await?,
            "address" => target.address = text_field(field).await?,
            "latitude" => {
                let value = text_field(field).await?;
                target.latitude = coordinate("latitude", value.as_deref(), 90.0)?;
            }
            "longitude" => {
                let value = text_field(field).await?;
                target.longitude = coordinate("longitude", value.as_deref(), 180.0)?;
            }
            other => tracing::debug!(field = other, "ignoring upload form field"),
        }
    }

    tracing::info!(
        user_id = %session.user.id,
        files = batch.files().len(),
        skipped = batch.skipped(),
        "upload submitted"
    );

    let report = batch
        .submit_with_progress(state.backend.as_ref(), &target, |completed, total| {
            tracing::debug!(completed, total, "upload progress");
        })
        .await?;

    let response = match report.error.clone() {
        None => (StatusCode::CREATED, Json(ApiResponse::success(report))),
        Some(message) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::partial(report, message)),
        ),
    };
    Ok::<_, ApiError>(response)
}

fn change_event(change: &PhotoChange) -> Event {
    let event = Event::default().event("photo");
    match event.json_data(change) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("failed to encode photo change: {e}");
            Event::default().event("photo").data(r#"{"kind":"resync"}"#)
        }
    }
}

/// Server-sent photo table changes. The subscription ends when the client
/// disconnects and the stream is dropped.
pub async fn photo_changes(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state
        .backend
        .subscribe_photo_changes()
        .into_stream()
        .map(|change| Ok(change_event(&change)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
