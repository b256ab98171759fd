//! SQLite and filesystem implementation of [`Backend`].
//!
//! Mirrors the hosted service closely enough for development and tests:
//! tables live in `{data_dir}/sitelens.db`, bucket objects under
//! `{data_dir}/storage/{bucket}`, and accounts in a local credential store.

mod bucket;
mod credentials;
mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tokio::sync::broadcast;

pub use bucket::{LocalBucket, is_valid_key};
pub use credentials::{MIN_PASSWORD_LEN, normalize_email, validate_password};

use self::credentials::{IssuedTokens, PasswordHashing, token_digest};
use self::schema::SCHEMA;
use super::{
    Backend, ObjectQuery, PhotoChange, PhotoFilter, PhotoSubscription, ProjectFilter,
    PublicUrlBuilder,
};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::*;

const ACCESS_TOKEN_TTL: Duration = Duration::hours(1);
const CHANGE_CHANNEL_CAPACITY: usize = 256;

const SITE_COLUMNS: &str = "id, name, latitude, longitude, radius_meters, folder_name, created_at";
const PROJECT_COLUMNS: &str = "id, name, site_id, status, created_at, completed_at";
const PHOTO_COLUMNS: &str = "id, file_name, site_id, project_id, user_id, latitude, longitude, \
     address, captured_at, uploaded_at, local_uri";
const PROFILE_COLUMNS: &str = "id, display_name, email, is_admin, created_at";

pub struct LocalBackend {
    conn: Mutex<Connection>,
    bucket: LocalBucket,
    urls: PublicUrlBuilder,
    hashing: PasswordHashing,
    changes: broadcast::Sender<PhotoChange>,
}

impl LocalBackend {
    pub fn open(config: &BackendConfig) -> Result<Self> {
        let conn = Connection::open(config.db_path())?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let base = config.public_base_url.as_deref().unwrap_or("");
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            conn: Mutex::new(conn),
            bucket: LocalBucket::new(&config.storage_dir(), &config.bucket),
            urls: PublicUrlBuilder::new(format!(
                "{}/storage/{}",
                base.trim_end_matches('/'),
                config.bucket
            )),
            hashing: PasswordHashing::new(),
            changes,
        })
    }

    /// Opens and initializes a backend rooted at `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let backend = Self::open(&BackendConfig::local(data_dir))?;
        backend.initialize()?;
        Ok(backend)
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection, for writes the
    /// trait doesn't cover (e.g. rows a mobile client would insert directly).
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn()
    }

    /// Live photo change subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn publish(&self, change: PhotoChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }

    fn issue_session(&self, conn: &Connection, user: AuthUser) -> Result<AuthSession> {
        let tokens = IssuedTokens::generate();
        let now = Utc::now();
        let expires_at = now + ACCESS_TOKEN_TTL;

        conn.execute(
            "INSERT INTO auth_sessions (id, user_id, access_digest, refresh_digest, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                user.id,
                tokens.access_digest,
                tokens.refresh_digest,
                format_datetime(&expires_at),
                format_datetime(&now),
            ],
        )?;

        Ok(AuthSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
            user,
        })
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand or by SQLite's datetime('now')
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

// Fixed width so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        radius_meters: row.get(4)?,
        folder_name: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status: String = row.get(3)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        site_id: row.get(2)?,
        status: ProjectStatus::parse(&status).unwrap_or_default(),
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        completed_at: row
            .get::<_, Option<String>>(5)?
            .map(|s| parse_datetime(&s)),
    })
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        file_name: row.get(1)?,
        site_id: row.get(2)?,
        project_id: row.get(3)?,
        user_id: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        address: row.get(7)?,
        captured_at: parse_datetime(&row.get::<_, String>(8)?),
        uploaded_at: parse_datetime(&row.get::<_, String>(9)?),
        local_uri: row.get(10)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        is_admin: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

/// WHERE clause and positional parameters for a photo filter.
fn photo_conditions(filter: &PhotoFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(site_id) = &filter.site_id {
        values.push(site_id.clone());
        clauses.push(format!("site_id = ?{}", values.len()));
    }
    if let Some(project_id) = &filter.project_id {
        values.push(project_id.clone());
        clauses.push(format!("project_id = ?{}", values.len()));
    }
    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (clause, values)
}

fn count(conn: &Connection, sql: &str, values: &[String]) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or_default())
}

#[async_trait]
impl Backend for LocalBackend {
    // Site operations

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY name, rowid"))?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sites)
    }

    async fn get_site(&self, id: &str) -> Result<Option<Site>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?1"),
            params![id],
            site_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    async fn find_site_at(&self, latitude: f64, longitude: f64) -> Result<Option<Site>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SITE_COLUMNS} FROM sites WHERE latitude = ?1 AND longitude = ?2
                 ORDER BY rowid LIMIT 1"
            ),
            params![latitude, longitude],
            site_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    async fn create_site(&self, site: &NewSite) -> Result<Site> {
        site.validate()?;
        let created = Site {
            id: uuid::Uuid::new_v4().to_string(),
            name: site.name.trim().to_string(),
            latitude: site.latitude,
            longitude: site.longitude,
            radius_meters: site.radius_meters,
            folder_name: site.folder_name.clone(),
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO sites (id, name, latitude, longitude, radius_meters, folder_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                created.id,
                created.name,
                created.latitude,
                created.longitude,
                created.radius_meters,
                created.folder_name,
                format_datetime(&created.created_at),
            ],
        )?;
        Ok(created)
    }

    async fn count_sites(&self) -> Result<u64> {
        count(&self.conn(), "SELECT COUNT(*) FROM sites", &[])
    }

    // Project operations

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(site_id) = &filter.site_id {
            values.push(site_id.clone());
            clauses.push(format!("site_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects{where_clause}
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let projects = stmt
            .query_map(params_from_iter(values.iter()), project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        project.validate()?;

        let conn = self.conn();
        let site_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sites WHERE id = ?1)",
            params![project.site_id],
            |row| row.get(0),
        )?;
        if !site_exists {
            return Err(Error::invalid(
                "project",
                format!("site {} does not exist", project.site_id),
            ));
        }

        let created = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: project.name.trim().to_string(),
            site_id: project.site_id.clone(),
            status: project.status,
            created_at: Utc::now(),
            completed_at: project.completed_at,
        };

        conn.execute(
            "INSERT INTO projects (id, name, site_id, status, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                created.id,
                created.name,
                created.site_id,
                created.status.as_str(),
                format_datetime(&created.created_at),
                created.completed_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(created)
    }

    async fn set_project_status(
        &self,
        id: &str,
        change: &StatusChange,
    ) -> Result<Option<Project>> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE projects SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![
                change.status.as_str(),
                change.completed_at.as_ref().map(format_datetime),
                id
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }

        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    async fn count_projects(&self, status: Option<ProjectStatus>) -> Result<u64> {
        let conn = self.conn();
        match status {
            Some(status) => count(
                &conn,
                "SELECT COUNT(*) FROM projects WHERE status = ?1",
                &[status.as_str().to_string()],
            ),
            None => count(&conn, "SELECT COUNT(*) FROM projects", &[]),
        }
    }

    // Photo operations

    async fn list_photos(&self, filter: &PhotoFilter) -> Result<Vec<Photo>> {
        let (where_clause, values) = photo_conditions(filter);
        let limit = filter
            .limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos{where_clause}
             ORDER BY captured_at DESC, rowid DESC{limit}"
        ))?;
        let photos = stmt
            .query_map(params_from_iter(values.iter()), photo_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }

    async fn count_photos(&self, filter: &PhotoFilter) -> Result<u64> {
        let (where_clause, values) = photo_conditions(filter);
        count(
            &self.conn(),
            &format!("SELECT COUNT(*) FROM photos{where_clause}"),
            &values,
        )
    }

    async fn insert_photo(&self, photo: &NewPhoto) -> Result<Photo> {
        let created = Photo {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: photo.file_name.clone(),
            site_id: photo.site_id.clone(),
            project_id: photo.project_id.clone(),
            user_id: photo.user_id.clone(),
            latitude: photo.latitude,
            longitude: photo.longitude,
            address: photo.address.clone(),
            captured_at: photo.captured_at,
            uploaded_at: Utc::now(),
            local_uri: None,
        };

        self.conn().execute(
            "INSERT INTO photos (id, file_name, site_id, project_id, user_id, latitude, longitude,
                                 address, captured_at, uploaded_at, local_uri)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)",
            params![
                created.id,
                created.file_name,
                created.site_id,
                created.project_id,
                created.user_id,
                created.latitude,
                created.longitude,
                created.address,
                format_datetime(&created.captured_at),
                format_datetime(&created.uploaded_at),
            ],
        )?;

        self.publish(PhotoChange::insert(&created.id));
        Ok(created)
    }

    async fn link_photo(&self, id: &str, link: &PhotoLink) -> Result<()> {
        if link.is_empty() {
            return Ok(());
        }

        let updated = self.conn().execute(
            "UPDATE photos SET site_id = COALESCE(?1, site_id), project_id = COALESCE(?2, project_id)
             WHERE id = ?3",
            params![link.site_id, link.project_id, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound);
        }

        self.publish(PhotoChange::update(id));
        Ok(())
    }

    // Profile operations

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE id = ?1"),
            params![user_id],
            profile_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE email = ?1 COLLATE NOCASE"
            ),
            params![email.trim()],
            profile_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    async fn count_profiles(&self) -> Result<u64> {
        count(&self.conn(), "SELECT COUNT(*) FROM user_profiles", &[])
    }

    async fn set_admin(&self, user_id: &str, is_admin: bool) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE user_profiles SET is_admin = ?1 WHERE id = ?2",
            params![is_admin, user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Storage operations

    async fn upload_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        tracing::debug!(key, content_type, size = data.len(), "storing object");
        self.bucket.put(key, &data).await
    }

    async fn download_object(&self, key: &str) -> Result<Option<Bytes>> {
        self.bucket.get(key).await
    }

    async fn list_objects(&self, query: &ObjectQuery) -> Result<Vec<StoredObject>> {
        self.bucket
            .list(&query.prefix, query.search.as_deref())
            .await
    }

    fn public_url(&self, key: &str) -> String {
        self.urls.object_url(key)
    }

    // Auth operations

    async fn sign_up(&self, credentials: &Credentials, display_name: &str) -> Result<AuthSession> {
        let email = normalize_email(&credentials.email)?;
        validate_password(&credentials.password)?;
        let password_hash = self.hashing.hash(&credentials.password)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM auth_users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        if taken {
            return Err(Error::Backend {
                status: 422,
                message: "User already registered".into(),
            });
        }

        // The first account bootstraps administration.
        let first: bool = tx.query_row(
            "SELECT NOT EXISTS(SELECT 1 FROM user_profiles)",
            [],
            |row| row.get(0),
        )?;

        let user_id = uuid::Uuid::new_v4().to_string();
        let now = format_datetime(&Utc::now());
        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };

        tx.execute(
            "INSERT INTO auth_users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, email, password_hash, now],
        )?;
        tx.execute(
            "INSERT INTO user_profiles (id, display_name, email, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, display_name, email, first, now],
        )?;

        let session = self.issue_session(
            &tx,
            AuthUser {
                id: user_id,
                email: Some(email),
            },
        )?;
        tx.commit()?;

        tracing::info!(user_id = %session.user.id, admin = first, "account created");
        Ok(session)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession> {
        let Ok(email) = normalize_email(&credentials.email) else {
            return Err(Error::InvalidCredentials);
        };

        let conn = self.conn();
        let account: Option<(String, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM auth_users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, password_hash)) = account else {
            return Err(Error::InvalidCredentials);
        };
        if !self.hashing.verify(&credentials.password, &password_hash)? {
            return Err(Error::InvalidCredentials);
        }

        self.issue_session(
            &conn,
            AuthUser {
                id: user_id,
                email: Some(email),
            },
        )
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let found: Option<(String, String, String)> = tx
            .query_row(
                "SELECT s.id, u.id, u.email FROM auth_sessions s
                 JOIN auth_users u ON u.id = s.user_id
                 WHERE s.refresh_digest = ?1",
                params![token_digest(refresh_token)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((session_id, user_id, email)) = found else {
            return Err(Error::Unauthorized);
        };

        // Refresh tokens are single use.
        tx.execute(
            "DELETE FROM auth_sessions WHERE id = ?1",
            params![session_id],
        )?;
        let session = self.issue_session(
            &tx,
            AuthUser {
                id: user_id,
                email: Some(email),
            },
        )?;
        tx.commit()?;
        Ok(session)
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT u.id, u.email FROM auth_sessions s
             JOIN auth_users u ON u.id = s.user_id
             WHERE s.access_digest = ?1 AND s.expires_at > ?2",
            params![token_digest(access_token), format_datetime(&Utc::now())],
            |row| {
                Ok(AuthUser {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM auth_sessions WHERE access_digest = ?1",
            params![token_digest(access_token)],
        )?;
        Ok(())
    }

    fn subscribe_photo_changes(&self) -> PhotoSubscription {
        PhotoSubscription::new(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PhotoChangeKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalBackend) {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::in_dir(temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    fn new_site(name: &str) -> NewSite {
        NewSite {
            name: name.to_string(),
            latitude: 25.7617,
            longitude: -80.1918,
            radius_meters: 100.0,
            folder_name: name.to_string(),
        }
    }

    fn new_photo(file_name: &str, site_id: Option<&str>, captured_at: &str) -> NewPhoto {
        NewPhoto {
            file_name: file_name.to_string(),
            site_id: site_id.map(str::to_string),
            project_id: None,
            user_id: None,
            latitude: 0.0,
            longitude: 0.0,
            address: None,
            captured_at: captured_at.parse().unwrap(),
        }
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_site_crud() {
        let (_dir, backend) = setup();

        let b = backend.create_site(&new_site("Bayfront")).await.unwrap();
        let a = backend.create_site(&new_site("Anchor")).await.unwrap();

        let names: Vec<_> = backend
            .list_sites()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Anchor", "Bayfront"]);

        assert_eq!(backend.get_site(&a.id).await.unwrap().unwrap(), a);
        assert!(backend.get_site("nope").await.unwrap().is_none());
        assert_eq!(backend.count_sites().await.unwrap(), 2);

        let found = backend.find_site_at(25.7617, -80.1918).await.unwrap();
        assert_eq!(found.unwrap().id, b.id);
        assert!(backend.find_site_at(0.0, 0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_site_validates() {
        let (_dir, backend) = setup();

        let mut site = new_site("Bad");
        site.latitude = 91.0;
        let err = backend.create_site(&site).await.unwrap_err();
        assert!(matches!(err, Error::Invalid { entity: "site", .. }));
        assert_eq!(backend.count_sites().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_project_status_transitions() {
        let (_dir, backend) = setup();
        let site = backend.create_site(&new_site("Site")).await.unwrap();

        let project = backend
            .create_project(&NewProject::active("Foundation", &site.id))
            .await
            .unwrap();
        assert!(project.is_consistent());

        let now = Utc::now();
        let completed = backend
            .set_project_status(&project.id, &StatusChange::to(ProjectStatus::Completed, now))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, ProjectStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert!(completed.is_consistent());

        assert_eq!(
            backend
                .count_projects(Some(ProjectStatus::Active))
                .await
                .unwrap(),
            0
        );

        let reopened = backend
            .set_project_status(&project.id, &StatusChange::to(ProjectStatus::Active, now))
            .await
            .unwrap()
            .unwrap();
        assert!(reopened.completed_at.is_none());

        assert!(
            backend
                .set_project_status("nope", &StatusChange::to(ProjectStatus::Active, now))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_project_requires_existing_site() {
        let (_dir, backend) = setup();
        let err = backend
            .create_project(&NewProject::active("Orphan", "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_list_projects_filters() {
        let (_dir, backend) = setup();
        let a = backend.create_site(&new_site("A")).await.unwrap();
        let b = backend.create_site(&new_site("B")).await.unwrap();

        let p1 = backend
            .create_project(&NewProject::active("One", &a.id))
            .await
            .unwrap();
        let p2 = backend
            .create_project(&NewProject::active("Two", &b.id))
            .await
            .unwrap();
        backend
            .set_project_status(
                &p2.id,
                &StatusChange::to(ProjectStatus::Completed, Utc::now()),
            )
            .await
            .unwrap();

        let active = backend
            .list_projects(&ProjectFilter {
                status: Some(ProjectStatus::Active),
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, p1.id);

        let on_b = backend
            .list_projects(&ProjectFilter {
                site_id: Some(b.id.clone()),
                ..ProjectFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(on_b.len(), 1);
        assert_eq!(on_b[0].id, p2.id);

        // Newest first
        let all = backend
            .list_projects(&ProjectFilter::default())
            .await
            .unwrap();
        assert_eq!(all[0].id, p2.id);
    }

    #[tokio::test]
    async fn test_photos_ordered_by_capture_time() {
        let (_dir, backend) = setup();

        backend
            .insert_photo(&new_photo("old.jpg", None, "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        backend
            .insert_photo(&new_photo("new.jpg", Some("s1"), "2024-06-01T00:00:00Z"))
            .await
            .unwrap();
        backend
            .insert_photo(&new_photo("mid.jpg", Some("s1"), "2024-03-01T00:00:00Z"))
            .await
            .unwrap();

        let names: Vec<_> = backend
            .list_photos(&PhotoFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.file_name)
            .collect();
        assert_eq!(names, vec!["new.jpg", "mid.jpg", "old.jpg"]);

        let limited = backend
            .list_photos(&PhotoFilter::site("s1").with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].file_name, "new.jpg");

        assert_eq!(
            backend.count_photos(&PhotoFilter::site("s1")).await.unwrap(),
            2
        );
        assert_eq!(
            backend
                .count_photos(&PhotoFilter::project("p"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_link_photo_is_partial() {
        let (_dir, backend) = setup();
        let photo = backend
            .insert_photo(&new_photo("a.jpg", Some("s1"), "2024-01-01T00:00:00Z"))
            .await
            .unwrap();

        backend
            .link_photo(&photo.id, &PhotoLink::project("p1"))
            .await
            .unwrap();

        let stored = backend.list_photos(&PhotoFilter::all()).await.unwrap();
        assert_eq!(stored[0].site_id.as_deref(), Some("s1"));
        assert_eq!(stored[0].project_id.as_deref(), Some("p1"));

        let err = backend
            .link_photo("missing", &PhotoLink::site("s2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let (_dir, backend) = setup();
        let mut subscription = backend.subscribe_photo_changes();

        let photo = backend
            .insert_photo(&new_photo("a.jpg", None, "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        backend
            .link_photo(&photo.id, &PhotoLink::site("s1"))
            .await
            .unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.kind, PhotoChangeKind::Insert);
        assert_eq!(first.photo_id.as_deref(), Some(photo.id.as_str()));
        let second = subscription.recv().await.unwrap();
        assert_eq!(second.kind, PhotoChangeKind::Update);
    }

    #[tokio::test]
    async fn test_objects_and_public_url() {
        let (_dir, backend) = setup();

        backend
            .upload_object("1700-a b.jpg", Bytes::from_static(b"img"), "image/jpeg")
            .await
            .unwrap();
        let err = backend
            .upload_object("1700-a b.jpg", Bytes::from_static(b"img"), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));

        let data = backend.download_object("1700-a b.jpg").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"img"[..]));

        let listed = backend
            .list_objects(&ObjectQuery {
                prefix: String::new(),
                search: Some("1700".into()),
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        assert_eq!(
            backend.public_url("1700-a b.jpg"),
            "/storage/photos/1700-a%20b.jpg"
        );
    }

    #[tokio::test]
    async fn test_first_account_is_admin() {
        let (_dir, backend) = setup();

        let first = backend
            .sign_up(&credentials("Boss@Example.com", "secret1"), "Boss")
            .await
            .unwrap();
        let second = backend
            .sign_up(&credentials("crew@example.com", "secret2"), "")
            .await
            .unwrap();

        let boss = backend.get_profile(&first.user.id).await.unwrap().unwrap();
        assert!(boss.is_admin);
        assert_eq!(boss.email, "boss@example.com");

        let crew = backend.get_profile(&second.user.id).await.unwrap().unwrap();
        assert!(!crew.is_admin);
        assert_eq!(crew.display_name, "crew");

        assert_eq!(backend.count_profiles().await.unwrap(), 2);

        backend.set_admin(&crew.id, true).await.unwrap();
        let found = backend
            .find_profile_by_email("CREW@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(found.is_admin);
    }

    #[tokio::test]
    async fn test_duplicate_signup_and_short_password() {
        let (_dir, backend) = setup();
        backend
            .sign_up(&credentials("a@example.com", "secret1"), "A")
            .await
            .unwrap();

        let dup = backend
            .sign_up(&credentials("A@example.com", "secret1"), "A")
            .await
            .unwrap_err();
        assert!(matches!(dup, Error::Backend { status: 422, .. }));

        let short = backend
            .sign_up(&credentials("b@example.com", "123"), "B")
            .await
            .unwrap_err();
        assert!(matches!(short, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (_dir, backend) = setup();
        backend
            .sign_up(&credentials("a@example.com", "secret1"), "A")
            .await
            .unwrap();

        let wrong = backend
            .sign_in(&credentials("a@example.com", "wrong-password"))
            .await
            .unwrap_err();
        assert!(matches!(wrong, Error::InvalidCredentials));

        let session = backend
            .sign_in(&credentials("a@example.com", "secret1"))
            .await
            .unwrap();
        assert!(session.expires_at > Utc::now());

        let user = backend
            .get_user(&session.access_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, session.user.id);

        let refreshed = backend
            .refresh_session(&session.refresh_token)
            .await
            .unwrap();
        assert_ne!(refreshed.access_token, session.access_token);
        assert!(backend.get_user(&session.access_token).await.unwrap().is_none());
        assert!(matches!(
            backend.refresh_session(&session.refresh_token).await,
            Err(Error::Unauthorized)
        ));

        backend.sign_out(&refreshed.access_token).await.unwrap();
        assert!(
            backend
                .get_user(&refreshed.access_token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_expired_access_token_is_unknown() {
        let (_dir, backend) = setup();
        let session = backend
            .sign_up(&credentials("a@example.com", "secret1"), "A")
            .await
            .unwrap();

        backend
            .connection()
            .execute(
                "UPDATE auth_sessions SET expires_at = '2000-01-01T00:00:00.000000Z'",
                [],
            )
            .unwrap();

        assert!(backend.get_user(&session.access_token).await.unwrap().is_none());
        // The refresh token still works after expiry.
        assert!(backend.refresh_session(&session.refresh_token).await.is_ok());
    }
}
