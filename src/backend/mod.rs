//! Access to the hosted backend: relational tables, the photo bucket, and the
//! auth service.
//!
//! Everything goes through the [`Backend`] trait. A single instance is built
//! from [`BackendConfig`] with [`connect`] and handed to whoever needs it, so
//! tests can swap in a [`LocalBackend`] or a mock.

pub mod local;
mod photo_url;
mod subscription;
mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub use local::LocalBackend;
pub use photo_url::{
    INLINE_IMAGE_PREFIX, PhotoSource, PublicUrlBuilder, classify_photo, display_url, find_photo_key,
    legacy_key_candidates, photo_exists, photo_url,
};
pub use subscription::{PhotoChange, PhotoChangeKind, PhotoSubscription};
pub use supabase::SupabaseBackend;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{Error, Result};
use crate::types::*;

/// Filter for photo listings. Results are always newest capture first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoFilter {
    pub site_id: Option<String>,
    pub project_id: Option<String>,
    pub limit: Option<usize>,
}

impl PhotoFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for project listings. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub site_id: Option<String>,
    pub status: Option<ProjectStatus>,
}

/// Bucket listing query: objects under `prefix` whose name contains `search`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectQuery {
    pub prefix: String,
    pub search: Option<String>,
}

/// Backend defines the data, storage, and auth interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    // Site operations
    async fn list_sites(&self) -> Result<Vec<Site>>;
    async fn get_site(&self, id: &str) -> Result<Option<Site>>;
    async fn find_site_at(&self, latitude: f64, longitude: f64) -> Result<Option<Site>>;
    async fn create_site(&self, site: &NewSite) -> Result<Site>;
    async fn count_sites(&self) -> Result<u64>;

    // Project operations
    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;
    async fn get_project(&self, id: &str) -> Result<Option<Project>>;
    async fn create_project(&self, project: &NewProject) -> Result<Project>;
    async fn set_project_status(&self, id: &str, change: &StatusChange)
    -> Result<Option<Project>>;
    async fn count_projects(&self, status: Option<ProjectStatus>) -> Result<u64>;

    // Photo operations
    async fn list_photos(&self, filter: &PhotoFilter) -> Result<Vec<Photo>>;
    async fn count_photos(&self, filter: &PhotoFilter) -> Result<u64>;
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<Photo>;
    async fn link_photo(&self, id: &str, link: &PhotoLink) -> Result<()>;

    // Profile operations
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
    async fn find_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>>;
    async fn count_profiles(&self) -> Result<u64>;
    async fn set_admin(&self, user_id: &str, is_admin: bool) -> Result<()>;

    // Storage operations
    async fn upload_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;
    async fn download_object(&self, key: &str) -> Result<Option<Bytes>>;
    async fn list_objects(&self, query: &ObjectQuery) -> Result<Vec<StoredObject>>;
    /// Public URL of an object in the photo bucket. Pure; never touches the network.
    fn public_url(&self, key: &str) -> String;

    // Auth operations
    async fn sign_up(&self, credentials: &Credentials, display_name: &str)
    -> Result<AuthSession>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession>;
    /// Resolves an access token. `Ok(None)` means the token is unknown or expired.
    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Live feed of photo table changes. Dropping the handle unsubscribes.
    fn subscribe_photo_changes(&self) -> PhotoSubscription;
}

/// Builds the backend named by `config`.
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn Backend>> {
    match config.kind {
        BackendKind::Local => {
            std::fs::create_dir_all(&config.data_dir)?;
            let backend = LocalBackend::open(config)?;
            backend.initialize()?;
            Ok(Arc::new(backend))
        }
        BackendKind::Supabase => {
            let supabase = config.supabase.as_ref().ok_or_else(|| {
                Error::Config("Supabase backend selected without URL and API key".into())
            })?;
            Ok(Arc::new(SupabaseBackend::new(
                supabase,
                &config.bucket,
                config.poll_interval,
            )?))
        }
    }
}
