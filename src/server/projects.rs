use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use futures::future::join_all;

use crate::backend::{PhotoFilter, ProjectFilter};
use crate::server::AppState;
use crate::server::dto::{
    CreateProjectRequest, ListProjectsParams, PhotoView, ProjectDetail, ProjectSummary,
};
use crate::server::response::{
    ApiError, ApiResponse, BackendOptionExt, BackendResultExt, or_empty,
};
use crate::server::validation::{project_status, validate_name};
use crate::types::{NewProject, ProjectStatus, StatusChange};

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListProjectsParams>,
) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let status = project_status(params.status.as_deref())?;

    let filter = ProjectFilter {
        site_id: None,
        status: Some(status),
    };
    let (projects, sites) = futures::join!(backend.list_projects(&filter), backend.list_sites());
    let projects = projects.api_err("Failed to list projects")?;
    let sites: HashMap<String, _> = or_empty(sites, "sites")
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    let filters: Vec<PhotoFilter> = projects
        .iter()
        .map(|p| PhotoFilter::project(&p.id))
        .collect();
    let counts = join_all(filters.iter().map(|f| backend.count_photos(f))).await;

    let summaries: Vec<ProjectSummary> = projects
        .into_iter()
        .zip(counts)
        .map(|(project, count)| ProjectSummary {
            site: sites.get(&project.site_id).cloned(),
            photo_count: or_empty(count, "project photo count"),
            project,
        })
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(summaries)))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    validate_name("Project", &req.name)?;

    let new_project = NewProject::active(req.name.trim(), req.site_id);
    new_project.validate()?;

    let project = state.backend.create_project(&new_project).await?;
    tracing::info!(project_id = %project.id, site_id = %project.site_id, "project created");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let project = backend
        .get_project(&id)
        .await
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    let photo_filter = PhotoFilter::project(&project.id);
    let (site, photos) = futures::join!(
        backend.get_site(&project.site_id),
        backend.list_photos(&photo_filter),
    );

    let detail = ProjectDetail {
        site: or_empty(site, "project site"),
        photos: PhotoView::list(backend, or_empty(photos, "project photos")),
        project,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}

async fn change_status(
    state: &AppState,
    id: &str,
    status: ProjectStatus,
) -> Result<impl IntoResponse + use<>, ApiError> {
    let change = StatusChange::to(status, Utc::now());
    let project = state
        .backend
        .set_project_status(id, &change)
        .await
        .api_err("Failed to update project")?
        .or_not_found("Project not found")?;

    tracing::info!(project_id = %project.id, status = %project.status, "project status changed");
    Ok(Json(ApiResponse::success(project)))
}

pub async fn complete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    change_status(&state, &id, ProjectStatus::Completed).await
}

pub async fn reopen_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    change_status(&state, &id, ProjectStatus::Active).await
}
