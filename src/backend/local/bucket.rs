use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::StoredObject;

const TEMP_DIR: &str = ".tmp";

/// A storage bucket backed by a directory. Object keys map to relative paths.
pub struct LocalBucket {
    base_path: PathBuf,
}

impl LocalBucket {
    pub fn new(storage_dir: &Path, bucket: &str) -> Self {
        Self {
            base_path: storage_dir.join(bucket),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(TEMP_DIR)
            .join(Uuid::new_v4().to_string())
    }

    /// Stores `data` under `key`. Existing objects are never replaced.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let final_path = self.object_path(key)?;
        if fs::try_exists(&final_path).await? {
            return Err(Error::AlreadyExists);
        }

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;
        drop(temp_file);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // hard_link refuses to clobber, so a racing writer for the same key loses.
        let linked = fs::hard_link(&temp_path, &final_path).await;
        let _ = fs::remove_file(&temp_path).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::AlreadyExists),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Files directly under `prefix` whose name contains `search`, sorted by name.
    pub async fn list(&self, prefix: &str, search: Option<&str>) -> Result<Vec<StoredObject>> {
        let prefix = prefix.trim_matches('/');
        let dir = if prefix.is_empty() {
            self.base_path.clone()
        } else {
            self.object_path(prefix)?
        };

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if search.is_some_and(|s| !name.contains(s)) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            objects.push(StoredObject {
                name,
                size: Some(metadata.len()),
                created_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(Error::BadRequest(format!("invalid object key: {key}")));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment.starts_with('.'))
    {
        return Err(Error::BadRequest(format!("invalid object key: {key}")));
    }
    Ok(())
}

#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    validate_key(key).is_ok()
}
