use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::backend::PhotoFilter;
use crate::error::Result;
use crate::server::AppState;
use crate::server::dto::{DashboardCounts, DashboardView, IntegrityWarning, PhotoView};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::ProjectStatus;

const RECENT_PHOTOS: usize = 6;
const DEBUG_LINK: &str = "/debug";

fn count(result: Result<u64>, what: &'static str, failures: &mut usize) -> u64 {
    result.unwrap_or_else(|e| {
        tracing::warn!("failed to count {what}: {e}");
        *failures += 1;
        0
    })
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let all_photos = PhotoFilter::all();
    let recent_filter = PhotoFilter::all().with_limit(RECENT_PHOTOS);
    let (sites, projects, active, completed, photos, recent) = futures::join!(
        backend.count_sites(),
        backend.count_projects(None),
        backend.count_projects(Some(ProjectStatus::Active)),
        backend.count_projects(Some(ProjectStatus::Completed)),
        backend.count_photos(&all_photos),
        backend.list_photos(&recent_filter),
    );

    let mut failures = 0;
    let counts = DashboardCounts {
        sites: count(sites, "sites", &mut failures),
        projects: count(projects, "projects", &mut failures),
        active_projects: count(active, "active projects", &mut failures),
        completed_projects: count(completed, "completed projects", &mut failures),
        photos: count(photos, "photos", &mut failures),
    };
    let recent = recent.unwrap_or_else(|e| {
        tracing::warn!("failed to load recent photos: {e}");
        failures += 1;
        Vec::new()
    });

    // Every query failing means the backend is unreachable, not just degraded.
    let error = (failures == 6).then(|| "Failed to load dashboard data".to_string());
    let warning = (error.is_none() && counts.photos > 0 && counts.sites == 0).then(|| {
        IntegrityWarning {
            message: "Photos exist but no sites found. This may indicate missing or orphaned data."
                .to_string(),
            link: DEBUG_LINK.to_string(),
        }
    });

    let view = DashboardView {
        counts,
        recent_photos: PhotoView::list(backend, recent),
        warning,
        error,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(view)))
}
