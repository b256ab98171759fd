use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::BackendKind;
use crate::error::{Error, Result};

/// Optional TOML config file. Every field may be omitted; command-line flags
/// and environment variables take precedence over values found here.
///
/// ```toml
/// [server]
/// host = "0.0.0.0"
/// port = 8080
///
/// [backend]
/// kind = "supabase"
/// url = "https://example.supabase.co"
/// api_key = "..."
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub backend: BackendSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_base_url: Option<String>,
    pub session_cookie: Option<String>,
    pub secure_cookies: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    pub kind: Option<BackendKind>,
    pub data_dir: Option<PathBuf>,
    pub bucket: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
