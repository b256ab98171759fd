use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::future::join_all;

use crate::backend::{PhotoFilter, ProjectFilter};
use crate::server::AppState;
use crate::server::dto::{CreateSiteRequest, PhotoView, SiteDetail, SiteSummary};
use crate::server::response::{
    ApiError, ApiResponse, BackendOptionExt, BackendResultExt, or_empty,
};
use crate::server::validation::validate_name;
use crate::sweep::folder_name_for;
use crate::types::NewSite;

const DEFAULT_RADIUS_METERS: f64 = 100.0;

pub async fn list_sites(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let sites = backend.list_sites().await.api_err("Failed to list sites")?;

    let filters: Vec<PhotoFilter> = sites.iter().map(|s| PhotoFilter::site(&s.id)).collect();
    let counts = join_all(filters.iter().map(|f| backend.count_photos(f))).await;

    let summaries: Vec<SiteSummary> = sites
        .into_iter()
        .zip(counts)
        .map(|(site, count)| SiteSummary {
            site,
            photo_count: or_empty(count, "site photo count"),
        })
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(summaries)))
}

pub async fn create_site(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSiteRequest>,
) -> impl IntoResponse {
    validate_name("Site", &req.name)?;

    let name = req.name.trim().to_string();
    let folder_name = req
        .folder_name
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| folder_name_for(&name));
    let new_site = NewSite {
        name,
        latitude: req.latitude,
        longitude: req.longitude,
        radius_meters: req.radius_meters.unwrap_or(DEFAULT_RADIUS_METERS),
        folder_name,
    };
    new_site.validate()?;

    let site = state.backend.create_site(&new_site).await?;
    tracing::info!(site_id = %site.id, name = %site.name, "site created");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(site))))
}

pub async fn get_site(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let backend = state.backend.as_ref();
    let site = backend
        .get_site(&id)
        .await
        .api_err("Failed to get site")?
        .or_not_found("Site not found")?;

    let project_filter = ProjectFilter {
        site_id: Some(site.id.clone()),
        status: None,
    };
    let photo_filter = PhotoFilter::site(&site.id);
    let (projects, photos) = futures::join!(
        backend.list_projects(&project_filter),
        backend.list_photos(&photo_filter),
    );

    let detail = SiteDetail {
        projects: or_empty(projects, "site projects"),
        photos: PhotoView::list(backend, or_empty(photos, "site photos")),
        site,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(detail)))
}
