//! # Sitelens
//!
//! A photo dashboard backend for construction sites, usable both as a
//! standalone binary and as a library.
//!
//! Sites own projects; photos are uploaded with their EXIF geotag and linked
//! to a site and project. Data lives behind the [`backend::Backend`] trait,
//! either a hosted Supabase project or a local SQLite database with a
//! filesystem bucket.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! sitelens = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sitelens::backend::connect;
//! use sitelens::config::{BackendConfig, ServerConfig};
//! use sitelens::server::{AppState, create_router};
//!
//! let backend = connect(&BackendConfig::local("./data")).unwrap();
//! let state = Arc::new(AppState::new(backend, ServerConfig::default(), "photos"));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

pub mod auth;
pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod sweep;
pub mod types;
pub mod upload;
