use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProjectStatus;
use crate::error::{Error, Result};

/// Prefix of device-local paths written by the mobile client.
pub const DEVICE_LOCAL_SCHEME: &str = "file://";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub folder_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSite {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub folder_name: String,
}

impl NewSite {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("site", "name cannot be empty"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::invalid(
                "site",
                format!("latitude {} is outside [-90, 90]", self.latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::invalid(
                "site",
                format!("longitude {} is outside [-180, 180]", self.longitude),
            ));
        }
        if self.radius_meters.is_nan() || self.radius_meters <= 0.0 {
            return Err(Error::invalid("site", "radius_meters must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub site_id: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Project {
    /// `completed_at` is set exactly when the project is completed.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.status.is_completed() == self.completed_at.is_some()
    }
}

/// A status transition with its matching completion timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusChange {
    pub status: ProjectStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    #[must_use]
    pub fn to(status: ProjectStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            completed_at: status.is_completed().then_some(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub site_id: String,
    pub status: ProjectStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewProject {
    #[must_use]
    pub fn active(name: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site_id: site_id.into(),
            status: ProjectStatus::Active,
            completed_at: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("project", "name cannot be empty"));
        }
        if self.site_id.is_empty() {
            return Err(Error::invalid("project", "site_id is required"));
        }
        if self.status.is_completed() != self.completed_at.is_some() {
            return Err(Error::invalid(
                "project",
                "completed_at must be set if and only if status is Completed",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub file_name: String,
    pub site_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub local_uri: Option<String>,
}

impl Photo {
    /// Captured on a phone and never pushed to shared storage.
    #[must_use]
    pub fn is_mobile_only(&self) -> bool {
        self.local_uri
            .as_deref()
            .is_some_and(|uri| uri.starts_with(DEVICE_LOCAL_SCHEME))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPhoto {
    pub file_name: String,
    pub site_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Partial update of a photo's site/project references. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoLink {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl PhotoLink {
    #[must_use]
    pub fn site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            project_id: None,
        }
    }

    #[must_use]
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            site_id: None,
            project_id: Some(project_id.into()),
        }
    }

    #[must_use]
    pub fn both(site_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            project_id: Some(project_id.into()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.site_id.is_none() && self.project_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Identity as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// An object in the photo bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(lat: f64, lon: f64, radius: f64) -> NewSite {
        NewSite {
            name: "North Yard".to_string(),
            latitude: lat,
            longitude: lon,
            radius_meters: radius,
            folder_name: "north_yard".to_string(),
        }
    }

    #[test]
    fn test_site_bounds() {
        assert!(site(90.0, -180.0, 1.0).validate().is_ok());
        assert!(site(90.5, 0.0, 100.0).validate().is_err());
        assert!(site(0.0, 180.1, 100.0).validate().is_err());
        assert!(site(0.0, 0.0, 0.0).validate().is_err());
        assert!(site(0.0, 0.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_status_change_sets_completed_at_only_when_completed() {
        let now = Utc::now();
        let done = StatusChange::to(ProjectStatus::Completed, now);
        assert_eq!(done.completed_at, Some(now));
        let reopened = StatusChange::to(ProjectStatus::Active, now);
        assert_eq!(reopened.completed_at, None);
    }

    #[test]
    fn test_new_project_rejects_inconsistent_completion() {
        let mut project = NewProject::active("Foundation", "site-1");
        assert!(project.validate().is_ok());

        project.completed_at = Some(Utc::now());
        assert!(project.validate().is_err());

        project.status = ProjectStatus::Completed;
        assert!(project.validate().is_ok());

        project.completed_at = None;
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_photo_address_may_be_null() {
        let json = serde_json::json!({
            "id": "p1",
            "file_name": "1700000000000-a.jpg",
            "site_id": null,
            "project_id": null,
            "latitude": 0.0,
            "longitude": 0.0,
            "address": null,
            "captured_at": "2024-05-01T10:00:00Z",
            "uploaded_at": "2024-05-01T10:00:01Z",
            "local_uri": null
        });
        let photo: Photo = serde_json::from_value(json).unwrap();
        assert!(photo.address.is_none());
        assert!(!photo.is_mobile_only());
    }
}
