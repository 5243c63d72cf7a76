//! Remote endpoint configuration

use std::env;
use std::time::Duration;

use medlink_chat::{ChatError, Result, SessionKey};
use url::Url;

pub const ENV_API_URL: &str = "MEDLINK_API_URL";
pub const ENV_SOCKET_URL: &str = "MEDLINK_SOCKET_URL";
pub const ENV_TOKEN: &str = "MEDLINK_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "MEDLINK_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the REST API (default: http://localhost:8080/api/)
    pub api_url: String,

    /// Base URL of the socket endpoint (default: ws://localhost:8080/ws/)
    pub socket_url: String,

    /// Bearer credential sent with every request and socket handshake
    pub token: Option<String>,

    /// Per-request timeout (default: 15s)
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api/".to_string(),
            socket_url: "ws://localhost:8080/ws/".to_string(),
            token: None,
            timeout: Duration::from_secs(15),
        }
    }
}

impl RemoteConfig {
    /// Defaults overridden by `MEDLINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = env::var(ENV_API_URL) {
            config.api_url = url;
        }
        if let Ok(url) = env::var(ENV_SOCKET_URL) {
            config.socket_url = url;
        }
        config.token = env::var(ENV_TOKEN).ok().filter(|t| !t.trim().is_empty());
        if let Ok(secs) = env::var(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ChatError::Validation(format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// API base with a trailing slash so relative joins stay under it
    pub fn api_base(&self) -> Result<Url> {
        parse_base(&self.api_url)
    }

    /// Socket URL for a session key: `<socket_url>/rooms/<id>` or `<socket_url>/users/<id>`
    pub fn socket_url_for(&self, key: &SessionKey) -> Result<Url> {
        let (kind, id) = match key {
            SessionKey::Room(id) => ("rooms", id.as_str()),
            SessionKey::User(id) => ("users", id.as_str()),
        };
        with_segments(parse_base(&self.socket_url)?, &[kind, id])
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| ChatError::Validation(format!("invalid URL {}: {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`
pub(crate) fn with_segments(mut base: Url, segments: &[&str]) -> Result<Url> {
    let shown = base.to_string();
    base.path_segments_mut()
        .map_err(|_| ChatError::Validation(format!("{} cannot be a base URL", shown)))?
        .pop_if_empty()
        .extend(segments);
    Ok(base)
}
