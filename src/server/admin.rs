use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireAdmin;
use crate::backend::PhotoFilter;
use crate::server::AppState;
use crate::server::dto::AdminStats;
use crate::server::response::{ApiError, ApiResponse, or_empty};

pub async fn admin_stats(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let all_photos = PhotoFilter::all();
    let (sites, projects, photos, users) = futures::join!(
        backend.count_sites(),
        backend.count_projects(None),
        backend.count_photos(&all_photos),
        backend.count_profiles(),
    );

    tracing::debug!(user_id = %admin.profile.id, "admin stats requested");

    let stats = AdminStats {
        total_sites: or_empty(sites, "site count"),
        total_projects: or_empty(projects, "project count"),
        total_photos: or_empty(photos, "photo count"),
        total_users: or_empty(users, "user count"),
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(stats)))
}
