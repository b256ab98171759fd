use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::{account, admin, dashboard, debug, photos, projects, sites, storage};
use crate::auth::session_gate;
use crate::backend::Backend;
use crate::config::ServerConfig;

/// Uploads carry whole batches of full-size photos.
const UPLOAD_BODY_LIMIT: usize = 100 * 1024 * 1024;

pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub config: ServerConfig,
    /// Bucket served by the object proxy.
    pub bucket: String,
}

impl AppState {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: ServerConfig, bucket: impl Into<String>) -> Self {
        Self {
            backend,
            config,
            bucket: bucket.into(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(dashboard::dashboard))
        // Sites
        .route("/sites", get(sites::list_sites).post(sites::create_site))
        .route("/sites/{id}", get(sites::get_site))
        // Projects
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/{id}", get(projects::get_project))
        .route("/projects/{id}/complete", post(projects::complete_project))
        .route("/projects/{id}/reopen", post(projects::reopen_project))
        // Photos
        .route("/photos", get(photos::list_photos))
        .route(
            "/photos/upload",
            post(photos::upload_photos).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/photos/changes", get(photos::photo_changes))
        // Admin and data tools
        .route("/admin", get(admin::admin_stats))
        .route("/debug", get(debug::sweep_report))
        .route("/debug/repair", post(debug::repair))
        .route("/debug/photos", get(debug::debug_photos))
        // Bucket objects
        .route("/storage/{bucket}/{*key}", get(storage::get_object))
        // Auth pages
        .route(
            "/auth/login",
            get(account::login_form).post(account::login),
        )
        .route(
            "/auth/signup",
            get(account::signup_form).post(account::signup),
        )
        .route("/logout", post(account::logout))
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
