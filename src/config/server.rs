use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_SESSION_COOKIE: &str = "sb-auth-token";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://photos.example.com").
    /// Used to build object URLs for the local backend. Defaults to the bind address.
    pub public_base_url: Option<String>,
    pub session_cookie: String,
    /// Adds `Secure` to session cookies. Enable when served over HTTPS.
    pub secure_cookies: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            secure_cookies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_prefers_public_url() {
        let mut config = ServerConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");

        config.public_base_url = Some("https://photos.example.com/".to_string());
        assert_eq!(config.base_url(), "https://photos.example.com");
    }
}
