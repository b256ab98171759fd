//! Photo upload: collect image files, read their geotags, then push each one
//! to the bucket and record it.
//!
//! A batch moves through `idle → collecting → uploading → success | error`.
//! Files go up strictly one after another; the first failure stops the batch
//! and nothing already stored is rolled back.

mod geotag;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use geotag::{Geotag, dms_to_decimal, read_geotag};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{NewPhoto, Photo};

const FALLBACK_FILE_NAME: &str = "upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Idle,
    Collecting,
    Uploading,
    Success,
    Error,
}

/// An accepted image waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
    pub geotag: Geotag,
}

impl UploadFile {
    /// Accepts `data` when it is an image, guessing the type from the file
    /// extension when `content_type` is missing or generic.
    #[must_use]
    pub fn image(file_name: &str, content_type: Option<&str>, data: Bytes) -> Option<Self> {
        let file_name = base_name(file_name);
        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
            .map(str::to_ascii_lowercase)
            .or_else(|| guess_image_type(&file_name).map(str::to_string))?;

        if !content_type.starts_with("image/") {
            tracing::debug!(file_name, content_type, "skipping non-image file");
            return None;
        }

        let geotag = read_geotag(&data);
        Some(Self {
            file_name,
            content_type,
            data,
            geotag,
        })
    }
}

/// Where a batch goes and what manual values override the EXIF ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadTarget {
    pub site_id: Option<String>,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

impl UploadTarget {
    fn coordinates_for(&self, geotag: &Geotag) -> (f64, f64) {
        self.latitude
            .zip(self.longitude)
            .or_else(|| geotag.coordinates())
            .unwrap_or((0.0, 0.0))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub status: UploadState,
    pub completed: usize,
    pub total: usize,
    pub photos: Vec<Photo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == UploadState::Success
    }
}

/// Builds `{millis}-{name}` keys. Millis never repeat within one batch.
#[derive(Debug)]
pub struct StorageKeys {
    last_millis: i64,
}

impl StorageKeys {
    #[must_use]
    pub fn starting_at(submitted_at: DateTime<Utc>) -> Self {
        Self {
            last_millis: submitted_at.timestamp_millis() - 1,
        }
    }

    pub fn next(&mut self, file_name: &str) -> String {
        let millis = Utc::now().timestamp_millis().max(self.last_millis + 1);
        self.last_millis = millis;
        format!("{millis}-{file_name}")
    }
}

#[derive(Debug)]
pub struct UploadBatch {
    state: UploadState,
    files: Vec<UploadFile>,
    skipped: usize,
}

impl Default for UploadBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadBatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: UploadState::Idle,
            files: Vec::new(),
            skipped: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> UploadState {
        self.state
    }

    #[must_use]
    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    /// Files dropped for not being images.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Adds a file if it is an image. Returns whether it was accepted.
    pub fn add(&mut self, file_name: &str, content_type: Option<&str>, data: Bytes) -> bool {
        self.state = UploadState::Collecting;
        match UploadFile::image(file_name, content_type, data) {
            Some(file) => {
                self.files.push(file);
                true
            }
            None => {
                self.skipped += 1;
                false
            }
        }
    }

    pub async fn submit(self, backend: &dyn Backend, target: &UploadTarget) -> Result<UploadReport> {
        self.submit_with_progress(backend, target, |_, _| {}).await
    }

    /// Uploads every file in order, calling `on_progress(completed, total)`
    /// after each record is inserted.
    ///
    /// Returns `Err` only when the batch is rejected before any backend call;
    /// failures part way through are reported in the [`UploadReport`].
    pub async fn submit_with_progress(
        mut self,
        backend: &dyn Backend,
        target: &UploadTarget,
        mut on_progress: impl FnMut(usize, usize) + Send,
    ) -> Result<UploadReport> {
        if target.site_id.is_none() && target.project_id.is_none() {
            return Err(Error::BadRequest("Please select a site or project".into()));
        }
        if self.files.is_empty() {
            return Err(Error::BadRequest("No image files to upload".into()));
        }

        self.state = UploadState::Uploading;
        let submitted_at = Utc::now();
        let total = self.files.len();
        let mut keys = StorageKeys::starting_at(submitted_at);
        let mut photos = Vec::with_capacity(total);

        for file in self.files {
            let key = keys.next(&file.file_name);
            match upload_one(backend, target, &file, &key, submitted_at).await {
                Ok(photo) => {
                    photos.push(photo);
                    on_progress(photos.len(), total);
                    tracing::info!(key, completed = photos.len(), total, "photo uploaded");
                }
                Err(message) => {
                    tracing::error!(key, completed = photos.len(), total, "{message}");
                    return Ok(UploadReport {
                        status: UploadState::Error,
                        completed: photos.len(),
                        total,
                        photos,
                        error: Some(message),
                    });
                }
            }
        }

        Ok(UploadReport {
            status: UploadState::Success,
            completed: total,
            total,
            photos,
            error: None,
        })
    }
}

async fn upload_one(
    backend: &dyn Backend,
    target: &UploadTarget,
    file: &UploadFile,
    key: &str,
    submitted_at: DateTime<Utc>,
) -> std::result::Result<Photo, String> {
    backend
        .upload_object(key, file.data.clone(), &file.content_type)
        .await
        .map_err(|e| format!("Storage upload failed: {e}"))?;

    let (latitude, longitude) = target.coordinates_for(&file.geotag);
    let photo = NewPhoto {
        file_name: key.to_string(),
        site_id: target.site_id.clone(),
        project_id: target.project_id.clone(),
        user_id: target.user_id.clone(),
        latitude,
        longitude,
        address: target.address.clone(),
        captured_at: file.geotag.captured_at.unwrap_or(submitted_at),
    };

    backend
        .insert_photo(&photo)
        .await
        .map_err(|e| format!("Database insert failed: {e}"))
}

/// Final path component; browsers sometimes send full client paths.
fn base_name(file_name: &str) -> String {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name.starts_with('.') {
        format!("{FALLBACK_FILE_NAME}{name}")
    } else {
        name.to_string()
    }
}

#[must_use]
pub fn guess_image_type(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let content_type = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(content_type)
}
