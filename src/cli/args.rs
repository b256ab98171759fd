use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use crate::config::{
    BackendConfig, BackendKind, DEFAULT_SESSION_COOKIE, FileConfig, ServerConfig, SupabaseConfig,
};

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

fn parse_kind(s: &str) -> Result<BackendKind, String> {
    BackendKind::parse(s)
        .ok_or_else(|| format!("unknown backend '{s}' (expected local or supabase)"))
}

/// Where the data lives. Flags and environment variables override the
/// config file.
#[derive(Debug, Clone, Default, Args)]
pub struct BackendArgs {
    /// TOML config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Backend to use: local or supabase
    #[arg(long, env = "SITELENS_BACKEND", value_parser = parse_kind)]
    pub backend: Option<BackendKind>,

    /// Data directory for the local backend
    #[arg(long, env = "SITELENS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Storage bucket holding photo files
    #[arg(long, env = "SITELENS_BUCKET")]
    pub bucket: Option<String>,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase anon key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,
}

impl BackendArgs {
    pub fn load_file(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => Ok(FileConfig::load(path)?),
            None => Ok(FileConfig::default()),
        }
    }

    pub fn resolve(&self, file: &FileConfig) -> anyhow::Result<BackendConfig> {
        let section = &file.backend;
        let data_dir = self
            .data_dir
            .clone()
            .or_else(|| section.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let mut config = match self.backend.or(section.kind).unwrap_or_default() {
            BackendKind::Local => BackendConfig::local(data_dir),
            BackendKind::Supabase => {
                let supabase = SupabaseConfig::from_parts(
                    self.supabase_url.clone().or_else(|| section.url.clone()),
                    self.supabase_key.clone().or_else(|| section.api_key.clone()),
                )?;
                let mut config = BackendConfig::supabase(supabase);
                config.data_dir = data_dir;
                config
            }
        };

        if let Some(bucket) = self.bucket.clone().or_else(|| section.bucket.clone()) {
            config.bucket = bucket;
        }
        if let Some(secs) = section.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Host to bind to [default: 127.0.0.1]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to [default: 8080]
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Public base URL for external access (e.g., "https://photos.example.com").
    /// Used to build photo URLs for the local backend.
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Name of the session cookie
    #[arg(long)]
    pub session_cookie: Option<String>,

    /// Mark session cookies Secure (serve over HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,
}

impl ServeArgs {
    #[must_use]
    pub fn resolve(&self, file: &FileConfig, data_dir: &Path) -> ServerConfig {
        let section = &file.server;
        ServerConfig {
            host: self
                .host
                .clone()
                .or_else(|| section.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.or(section.port).unwrap_or(DEFAULT_PORT),
            data_dir: data_dir.to_path_buf(),
            public_base_url: self
                .public_base_url
                .clone()
                .or_else(|| section.public_base_url.clone()),
            session_cookie: self
                .session_cookie
                .clone()
                .or_else(|| section.session_cookie.clone())
                .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string()),
            secure_cookies: self.secure_cookies || section.secure_cookies.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig::parse(
            r#"
            [server]
            port = 9000
            host = "0.0.0.0"

            [backend]
            data_dir = "/srv/sitelens"
            bucket = "site-photos"
            "#,
        )
        .unwrap();

        let args = BackendArgs {
            data_dir: Some(PathBuf::from("/tmp/override")),
            ..BackendArgs::default()
        };
        let backend = args.resolve(&file).unwrap();
        assert_eq!(backend.kind, BackendKind::Local);
        assert_eq!(backend.data_dir, PathBuf::from("/tmp/override"));
        assert_eq!(backend.bucket, "site-photos");

        let serve = ServeArgs {
            port: Some(3000),
            ..ServeArgs::default()
        };
        let server = serve.resolve(&file, &backend.data_dir);
        assert_eq!(server.port, 3000);
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.session_cookie, DEFAULT_SESSION_COOKIE);
    }

    #[test]
    fn test_supabase_without_credentials_fails() {
        let args = BackendArgs {
            backend: Some(BackendKind::Supabase),
            ..BackendArgs::default()
        };
        assert!(args.resolve(&FileConfig::default()).is_err());

        let args = BackendArgs {
            backend: Some(BackendKind::Supabase),
            supabase_url: Some("https://x.supabase.co".into()),
            supabase_key: Some("anon".into()),
            ..BackendArgs::default()
        };
        let config = args.resolve(&FileConfig::default()).unwrap();
        assert_eq!(config.kind, BackendKind::Supabase);
        assert!(config.supabase.is_some());
    }

    #[test]
    fn test_parse_kind_rejects_unknown() {
        assert_eq!(parse_kind("LOCAL"), Ok(BackendKind::Local));
        assert!(parse_kind("firebase").is_err());
    }
}
