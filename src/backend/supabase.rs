//! Hosted backend over the Supabase REST APIs (PostgREST, Storage, GoTrue).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

use super::{
    Backend, ObjectQuery, PhotoChange, PhotoFilter, PhotoSubscription, ProjectFilter,
    PublicUrlBuilder,
};
use crate::config::SupabaseConfig;
use crate::error::{Error, Result};
use crate::types::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_LIMIT: u32 = 1000;
const SUBSCRIPTION_CAPACITY: usize = 64;

/// Query pairs appended to a PostgREST URL.
type Query = Vec<(&'static str, String)>;

#[derive(Clone)]
pub struct SupabaseBackend {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    urls: PublicUrlBuilder,
    poll_interval: Duration,
}

impl SupabaseBackend {
    pub fn new(config: &SupabaseConfig, bucket: &str, poll_interval: Duration) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = config.url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            urls: PublicUrlBuilder::new(format!(
                "{base_url}/storage/v1/object/public/{bucket}"
            )),
            base_url,
            api_key: config.api_key.clone(),
            bucket: bucket.to_string(),
            poll_interval,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authed(method, path, &self.api_key)
    }

    fn authed(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
    }

    fn object_path(&self, key: &str) -> String {
        let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
        format!("/storage/v1/object/{}/{}", self.bucket, encoded.join("/"))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>> {
        let response = self.table(Method::GET, table).query(query).send().await?;
        parse_json(response).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        mut query: Query,
    ) -> Result<Option<T>> {
        query.push(("limit", "1".into()));
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .table(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = parse_json(response).await?;
        rows.into_iter().next().ok_or_else(|| Error::Backend {
            status: 500,
            message: format!("insert into {table} returned no row"),
        })
    }

    async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
        body: &B,
    ) -> Result<Vec<T>> {
        let response = self
            .table(Method::PATCH, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn count(&self, table: &str, query: &Query) -> Result<u64> {
        let response = self
            .table(Method::HEAD, table)
            .query(&[("select", "*")])
            .query(query)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check(response).await?;
        content_range_total(response.headers()).ok_or_else(|| Error::Backend {
            status: response.status().as_u16(),
            message: format!("count of {table} returned no Content-Range total"),
        })
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession> {
        let response = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = parse_json(response).await?;
        token.into_session()
    }

    /// Row count and newest upload, used to notice table changes.
    async fn photo_fingerprint(&self) -> Result<PhotoFingerprint> {
        let count = self.count("photos", &Vec::new()).await?;
        let newest: Option<NewestPhoto> = self
            .select_one(
                "photos",
                vec![
                    ("select", "id,uploaded_at".into()),
                    ("order", "uploaded_at.desc".into()),
                ],
            )
            .await?;
        Ok(PhotoFingerprint {
            count,
            newest_id: newest.as_ref().map(|n| n.id.clone()),
            newest_at: newest.map(|n| n.uploaded_at),
        })
    }

    async fn poll_photo_changes(self, tx: broadcast::Sender<PhotoChange>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last: Option<PhotoFingerprint> = None;

        loop {
            interval.tick().await;
            let current = match self.photo_fingerprint().await {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    tracing::warn!("photo change poll failed: {e}");
                    continue;
                }
            };

            if let Some(change) = fingerprint_change(last.as_ref(), &current) {
                if tx.send(change).is_err() {
                    return;
                }
            }
            last = Some(current);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PhotoFingerprint {
    count: u64,
    newest_id: Option<String>,
    newest_at: Option<DateTime<Utc>>,
}

/// The event implied by the table moving from `previous` to `current`. A
/// grown table with a newest row is an insert; any other movement is a
/// resync. The first poll only sets the baseline.
fn fingerprint_change(
    previous: Option<&PhotoFingerprint>,
    current: &PhotoFingerprint,
) -> Option<PhotoChange> {
    let previous = previous.filter(|previous| *previous != current)?;
    match &current.newest_id {
        Some(id) if current.count > previous.count => Some(PhotoChange::insert(id.clone())),
        _ => Some(PhotoChange::resync()),
    }
}

#[derive(Deserialize)]
struct NewestPhoto {
    id: String,
    uploaded_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<AuthUser>,
}

impl TokenResponse {
    fn into_session(self) -> Result<AuthSession> {
        let (Some(access_token), Some(refresh_token), Some(user)) =
            (self.access_token, self.refresh_token, self.user)
        else {
            // Sign-up with email confirmation enabled returns a bare user.
            return Err(Error::BadRequest(
                "check your email to confirm the account, then sign in".into(),
            ));
        };

        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            })
            .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

        Ok(AuthSession {
            access_token,
            refresh_token,
            expires_at,
            user,
        })
    }
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    /// Folders come back without an id.
    id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    metadata: Option<ObjectMetadata>,
}

#[derive(Deserialize)]
struct ObjectMetadata {
    size: Option<u64>,
}

/// Picks the most specific message out of a Supabase error body.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let message = [
            parsed.message,
            parsed.msg,
            parsed.error_description,
            parsed.error,
        ]
        .into_iter()
        .flatten()
        .find(|m| !m.is_empty());
        if let Some(message) = message {
            return message;
        }
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Backend {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Total from a `Content-Range: 0-9/42` (or `*/42`) header.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit_once('/')?
        .1
        .parse()
        .ok()
}

fn photo_query(filter: &PhotoFilter) -> Query {
    let mut query = Query::new();
    if let Some(site_id) = &filter.site_id {
        query.push(("site_id", format!("eq.{site_id}")));
    }
    if let Some(project_id) = &filter.project_id {
        query.push(("project_id", format!("eq.{project_id}")));
    }
    query
}

#[async_trait]
impl Backend for SupabaseBackend {
    // Site operations

    async fn list_sites(&self) -> Result<Vec<Site>> {
        self.select(
            "sites",
            &vec![("select", "*".into()), ("order", "name.asc".into())],
        )
        .await
    }

    async fn get_site(&self, id: &str) -> Result<Option<Site>> {
        self.select_one(
            "sites",
            vec![("select", "*".into()), ("id", format!("eq.{id}"))],
        )
        .await
    }

    async fn find_site_at(&self, latitude: f64, longitude: f64) -> Result<Option<Site>> {
        self.select_one(
            "sites",
            vec![
                ("select", "*".into()),
                ("latitude", format!("eq.{latitude}")),
                ("longitude", format!("eq.{longitude}")),
            ],
        )
        .await
    }

    async fn create_site(&self, site: &NewSite) -> Result<Site> {
        site.validate()?;
        self.insert("sites", site).await
    }

    async fn count_sites(&self) -> Result<u64> {
        self.count("sites", &Query::new()).await
    }

    // Project operations

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(site_id) = &filter.site_id {
            query.push(("site_id", format!("eq.{site_id}")));
        }
        if let Some(status) = filter.status {
            query.push(("status", format!("eq.{status}")));
        }
        self.select("projects", &query).await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.select_one(
            "projects",
            vec![("select", "*".into()), ("id", format!("eq.{id}"))],
        )
        .await
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project> {
        project.validate()?;
        self.insert("projects", project).await
    }

    async fn set_project_status(
        &self,
        id: &str,
        change: &StatusChange,
    ) -> Result<Option<Project>> {
        let rows: Vec<Project> = self.update("projects", id, change).await?;
        Ok(rows.into_iter().next())
    }

    async fn count_projects(&self, status: Option<ProjectStatus>) -> Result<u64> {
        let query = status
            .map(|s| vec![("status", format!("eq.{s}"))])
            .unwrap_or_default();
        self.count("projects", &query).await
    }

    // Photo operations

    async fn list_photos(&self, filter: &PhotoFilter) -> Result<Vec<Photo>> {
        let mut query = photo_query(filter);
        query.push(("select", "*".into()));
        query.push(("order", "captured_at.desc".into()));
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        self.select("photos", &query).await
    }

    async fn count_photos(&self, filter: &PhotoFilter) -> Result<u64> {
        self.count("photos", &photo_query(filter)).await
    }

    async fn insert_photo(&self, photo: &NewPhoto) -> Result<Photo> {
        self.insert("photos", photo).await
    }

    async fn link_photo(&self, id: &str, link: &PhotoLink) -> Result<()> {
        if link.is_empty() {
            return Ok(());
        }
        let rows: Vec<serde_json::Value> = self.update("photos", id, link).await?;
        if rows.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Profile operations

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.select_one(
            "user_profiles",
            vec![("select", "*".into()), ("id", format!("eq.{user_id}"))],
        )
        .await
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        self.select_one(
            "user_profiles",
            vec![
                ("select", "*".into()),
                ("email", format!("eq.{}", email.trim().to_ascii_lowercase())),
            ],
        )
        .await
    }

    async fn count_profiles(&self) -> Result<u64> {
        self.count("user_profiles", &Query::new()).await
    }

    async fn set_admin(&self, user_id: &str, is_admin: bool) -> Result<()> {
        let rows: Vec<serde_json::Value> = self
            .update("user_profiles", user_id, &json!({ "is_admin": is_admin }))
            .await?;
        if rows.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Storage operations

    async fn upload_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &self.object_path(key))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn download_object(&self, key: &str) -> Result<Option<Bytes>> {
        let response = self
            .request(Method::GET, &self.object_path(key))
            .send()
            .await?;
        // Storage reports a missing object as 400 or 404 depending on version.
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST
        ) {
            return Ok(None);
        }
        let response = check(response).await?;
        Ok(Some(response.bytes().await?))
    }

    async fn list_objects(&self, query: &ObjectQuery) -> Result<Vec<StoredObject>> {
        let body = json!({
            "prefix": query.prefix,
            "search": query.search.as_deref().unwrap_or(""),
            "limit": LIST_LIMIT,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });
        let response = self
            .request(
                Method::POST,
                &format!("/storage/v1/object/list/{}", self.bucket),
            )
            .json(&body)
            .send()
            .await?;
        let listed: Vec<ListedObject> = parse_json(response).await?;

        Ok(listed
            .into_iter()
            .filter(|o| o.id.is_some())
            .map(|o| StoredObject {
                name: o.name,
                size: o.metadata.and_then(|m| m.size),
                created_at: o.created_at,
            })
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        self.urls.object_url(key)
    }

    // Auth operations

    async fn sign_up(&self, credentials: &Credentials, display_name: &str) -> Result<AuthSession> {
        let response = self
            .request(Method::POST, "/auth/v1/signup")
            .json(&json!({
                "email": credentials.email.trim(),
                "password": credentials.password,
                "data": { "display_name": display_name },
            }))
            .send()
            .await?;
        let token: TokenResponse = parse_json(response).await?;
        token.into_session()
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession> {
        let result = self
            .token(
                "password",
                json!({ "email": credentials.email.trim(), "password": credentials.password }),
            )
            .await;
        match result {
            Err(Error::Backend { status: 400, .. }) => Err(Error::InvalidCredentials),
            other => other,
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let result = self
            .token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await;
        match result {
            Err(Error::Backend {
                status: 400 | 401, ..
            }) => Err(Error::Unauthorized),
            other => other,
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let response = self
            .authed(Method::GET, "/auth/v1/user", access_token)
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }
        parse_json(response).await.map(Some)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .authed(Method::POST, "/auth/v1/logout", access_token)
            .send()
            .await?;
        // An already-invalid token is as signed out as it gets.
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    fn subscribe_photo_changes(&self) -> PhotoSubscription {
        let (tx, rx) = broadcast::channel(SUBSCRIPTION_CAPACITY);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let feeder = handle.spawn(self.clone().poll_photo_changes(tx));
                PhotoSubscription::with_feeder(rx, feeder)
            }
            Err(_) => {
                tracing::warn!("no async runtime; photo change feed is closed");
                PhotoSubscription::new(rx)
            }
        }
    }
}
