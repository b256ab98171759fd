use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_BUCKET: &str = "photos";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite tables and a filesystem bucket under the data directory.
    #[default]
    Local,
    /// Hosted Supabase project.
    Supabase,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<BackendKind> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "supabase" => Some(Self::Supabase),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Supabase => f.write_str("supabase"),
        }
    }
}

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
}

// Keeps the key out of logs.
impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SupabaseConfig {
    /// Builds the config from optional parts. Missing or malformed values
    /// are a startup error.
    pub fn from_parts(url: Option<String>, api_key: Option<String>) -> Result<Self> {
        let url = url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            Error::Config("missing Supabase URL (set SUPABASE_URL or --supabase-url)".into())
        })?;
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            Error::Config(
                "missing Supabase API key (set SUPABASE_ANON_KEY or --supabase-key)".into(),
            )
        })?;

        let parsed = url::Url::parse(&url)
            .map_err(|e| Error::Config(format!("invalid Supabase URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Supabase URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub data_dir: PathBuf,
    pub bucket: String,
    pub supabase: Option<SupabaseConfig>,
    /// How often the hosted change feed polls the photo table.
    pub poll_interval: Duration,
    /// Base of the server that proxies local bucket objects. Local object
    /// URLs are relative when unset.
    pub public_base_url: Option<String>,
}

impl BackendConfig {
    #[must_use]
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Local,
            data_dir: data_dir.into(),
            bucket: DEFAULT_BUCKET.to_string(),
            supabase: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            public_base_url: None,
        }
    }

    #[must_use]
    pub fn supabase(config: SupabaseConfig) -> Self {
        Self {
            kind: BackendKind::Supabase,
            data_dir: PathBuf::from("./data"),
            bucket: DEFAULT_BUCKET.to_string(),
            supabase: Some(config),
            poll_interval: DEFAULT_POLL_INTERVAL,
            public_base_url: None,
        }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sitelens.db")
    }

    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let err = SupabaseConfig::from_parts(None, Some("key".into())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err =
            SupabaseConfig::from_parts(Some("https://x.supabase.co".into()), Some(" ".into()))
                .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_url_is_validated_and_trimmed() {
        assert!(SupabaseConfig::from_parts(Some("ftp://x".into()), Some("k".into())).is_err());

        let config =
            SupabaseConfig::from_parts(Some("https://x.supabase.co/".into()), Some("k".into()))
                .unwrap();
        assert_eq!(config.url, "https://x.supabase.co");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = SupabaseConfig {
            url: "https://x.supabase.co".into(),
            api_key: "secret-key".into(),
        };
        assert!(!format!("{config:?}").contains("secret-key"));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(BackendKind::parse("Supabase"), Some(BackendKind::Supabase));
        assert_eq!(BackendKind::parse("local"), Some(BackendKind::Local));
        assert_eq!(BackendKind::parse("firebase"), None);
    }
}
