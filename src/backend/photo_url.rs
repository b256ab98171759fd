use super::{Backend, ObjectQuery};
use crate::error::Result;
use crate::types::{DEVICE_LOCAL_SCHEME, Photo};

pub const INLINE_IMAGE_PREFIX: &str = "data:image";

/// Builds public object URLs under a fixed bucket prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrlBuilder {
    prefix: String,
}

impl PublicUrlBuilder {
    /// `prefix` is everything before the object key, e.g.
    /// `https://x.supabase.co/storage/v1/object/public/photos`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        let encoded: Vec<_> = key
            .trim_start_matches('/')
            .split('/')
            .map(urlencoding::encode)
            .collect();
        format!("{}/{}", self.prefix, encoded.join("/"))
    }
}

/// Where a photo's image bytes can be found, judged from stored fields only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSource<'a> {
    /// No file name recorded.
    Missing,
    /// Captured on a device and never uploaded.
    MobileOnly,
    /// Already an absolute http(s) URL.
    Remote(&'a str),
    /// An inline `data:image/...` payload.
    Inline(&'a str),
    /// A device-local path stored in `file_name`.
    DevicePath,
    /// An object key in the shared bucket.
    StorageKey(&'a str),
}

#[must_use]
pub fn classify_photo<'a>(file_name: &'a str, local_uri: Option<&str>) -> PhotoSource<'a> {
    if file_name.is_empty() {
        return PhotoSource::Missing;
    }
    if local_uri.is_some_and(|uri| uri.starts_with(DEVICE_LOCAL_SCHEME)) {
        return PhotoSource::MobileOnly;
    }
    if file_name.starts_with("http://") || file_name.starts_with("https://") {
        return PhotoSource::Remote(file_name);
    }
    if file_name.starts_with(INLINE_IMAGE_PREFIX) {
        return PhotoSource::Inline(file_name);
    }
    if file_name.starts_with(DEVICE_LOCAL_SCHEME) {
        return PhotoSource::DevicePath;
    }
    PhotoSource::StorageKey(file_name)
}

/// Displayable URL for a photo, or an empty string when there is nothing to
/// show. Callers render a placeholder for empty URLs and for load failures.
#[must_use]
pub fn photo_url(urls: &PublicUrlBuilder, file_name: &str, local_uri: Option<&str>) -> String {
    match classify_photo(file_name, local_uri) {
        PhotoSource::Remote(url) | PhotoSource::Inline(url) => url.to_string(),
        PhotoSource::StorageKey(key) => urls.object_url(key),
        PhotoSource::Missing | PhotoSource::MobileOnly | PhotoSource::DevicePath => {
            tracing::debug!(file_name, ?local_uri, "photo has no displayable source");
            String::new()
        }
    }
}

/// [`photo_url`] for a stored photo, using the backend's own bucket URLs.
#[must_use]
pub fn display_url(backend: &dyn Backend, photo: &Photo) -> String {
    match classify_photo(&photo.file_name, photo.local_uri.as_deref()) {
        PhotoSource::Remote(url) | PhotoSource::Inline(url) => url.to_string(),
        PhotoSource::StorageKey(key) => backend.public_url(key),
        PhotoSource::Missing | PhotoSource::MobileOnly | PhotoSource::DevicePath => String::new(),
    }
}

/// Paths older clients used for the same file. Only the debug view probes
/// these; new uploads always use the canonical key.
#[must_use]
pub fn legacy_key_candidates(file_name: &str, user_id: Option<&str>) -> Vec<String> {
    let file_name = file_name.trim_start_matches('/');
    let mut candidates = vec![
        file_name.to_string(),
        format!("photos/{file_name}"),
        format!("public/{file_name}"),
    ];
    if let Some(uid) = user_id {
        candidates.push(format!("{uid}/{file_name}"));
        candidates.push(format!("users/{uid}/{file_name}"));
        candidates.push(format!("{uid}/photos/{file_name}"));
    }
    candidates
}

/// True when an object with exactly this key is in the bucket.
pub async fn photo_exists(backend: &dyn Backend, key: &str) -> Result<bool> {
    let (prefix, name) = match key.rsplit_once('/') {
        Some((prefix, name)) => (prefix.to_string(), name),
        None => (String::new(), key),
    };
    let objects = backend
        .list_objects(&ObjectQuery {
            prefix,
            search: Some(name.to_string()),
        })
        .await?;
    Ok(objects.iter().any(|o| o.name == name))
}

/// Probes the legacy locations in order and returns the first key that exists.
/// Listing errors on one candidate are skipped.
pub async fn find_photo_key(
    backend: &dyn Backend,
    file_name: &str,
    user_id: Option<&str>,
) -> Option<String> {
    for candidate in legacy_key_candidates(file_name, user_id) {
        match photo_exists(backend, &candidate).await {
            Ok(true) => return Some(candidate),
            Ok(false) => {}
            Err(e) => tracing::debug!(candidate, "photo path probe failed: {e}"),
        }
    }
    None
}
