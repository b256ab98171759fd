use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, display_url};
use crate::sweep::{RepairLog, StepLevel};
use crate::types::{Photo, Project, Site, StoredObject};

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub folder_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub site_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProjectsParams {
    #[serde(default)]
    pub status: Option<String>,
}

/// `all` (or an empty value) means no filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListPhotosParams {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A photo with the URL a client should load it from. `display_url` is empty
/// when the image is not available (no file, or only on the capturing phone).
#[derive(Debug, Serialize)]
pub struct PhotoView {
    #[serde(flatten)]
    pub photo: Photo,
    pub display_url: String,
    pub mobile_only: bool,
}

impl PhotoView {
    pub fn new(backend: &dyn Backend, photo: Photo) -> Self {
        Self {
            display_url: display_url(backend, &photo),
            mobile_only: photo.is_mobile_only(),
            photo,
        }
    }

    pub fn list(backend: &dyn Backend, photos: Vec<Photo>) -> Vec<Self> {
        photos.into_iter().map(|p| Self::new(backend, p)).collect()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct DashboardCounts {
    pub sites: u64,
    pub projects: u64,
    pub active_projects: u64,
    pub completed_projects: u64,
    pub photos: u64,
}

#[derive(Debug, Serialize)]
pub struct IntegrityWarning {
    pub message: String,
    pub link: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub counts: DashboardCounts,
    pub recent_photos: Vec<PhotoView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<IntegrityWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SiteSummary {
    #[serde(flatten)]
    pub site: Site,
    pub photo_count: u64,
}

#[derive(Debug, Serialize)]
pub struct SiteDetail {
    pub site: Site,
    pub projects: Vec<Project>,
    pub photos: Vec<PhotoView>,
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub site: Option<Site>,
    pub photo_count: u64,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub site: Option<Site>,
    pub photos: Vec<PhotoView>,
}

/// Selected filters, echoed back with `all` for unset values.
#[derive(Debug, Serialize)]
pub struct PhotoFilterView {
    pub site_id: String,
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub struct PhotoListView {
    pub photos: Vec<PhotoView>,
    pub filter: PhotoFilterView,
    pub sites: Vec<Site>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub total_sites: u64,
    pub total_projects: u64,
    pub total_photos: u64,
    pub total_users: u64,
}

#[derive(Debug, Serialize)]
pub struct RepairView {
    pub photo_id: Option<String>,
    pub failed: bool,
    pub steps: Vec<RepairStepView>,
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RepairStepView {
    pub level: StepLevel,
    pub message: String,
}

impl From<RepairLog> for RepairView {
    fn from(log: RepairLog) -> Self {
        Self {
            failed: log.failed(),
            lines: log.lines(),
            photo_id: log.photo_id,
            steps: log
                .steps
                .into_iter()
                .map(|s| RepairStepView {
                    level: s.level,
                    message: s.message,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PhotoProbe {
    pub id: String,
    pub file_name: String,
    pub source: &'static str,
    pub display_url: String,
    /// Bucket key the file was actually found under, when probing found one.
    pub found_key: Option<String>,
    pub found_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DebugPhotosView {
    pub photos: Vec<PhotoProbe>,
    pub objects: Vec<StoredObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthFormView {
    pub action: &'static str,
    pub fields: Vec<&'static str>,
    pub alternate: &'static str,
    pub min_password_length: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user_id: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub redirect_to: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LogoutView {
    pub redirect_to: &'static str,
}
