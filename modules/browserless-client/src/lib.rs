pub mod error;

pub use error::{BrowserlessError, FailureKind, Result};

use std::time::Duration;

use url::Url;

/// Hosted regions and their websocket hosts.
const REGIONS: &[(&str, &str)] = &[
    ("sfo", "wss://production-sfo.browserless.io"),
    ("lon", "wss://production-lon.browserless.io"),
    ("ams", "wss://production-ams.browserless.io"),
];

const DEFAULT_REGION: &str = "sfo";

/// Connection details for a Browserless pool. Holds no sockets; the CDP
/// client connects to [`BrowserlessClient::websocket_url`].
#[derive(Debug, Clone)]
pub struct BrowserlessClient {
    base_url: Url,
    token: Option<String>,
    session_timeout: Option<Duration>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| BrowserlessError::InvalidEndpoint(format!("{base_url}: {e}")))?;

        match base_url.scheme() {
            "ws" | "wss" | "http" | "https" => {}
            other => {
                return Err(BrowserlessError::InvalidEndpoint(format!(
                    "unsupported scheme {other}"
                )))
            }
        }

        Ok(Self {
            base_url,
            token: token.filter(|t| !t.is_empty()).map(String::from),
            session_timeout: None,
        })
    }

    /// Build a client for a hosted region when no explicit URL is configured.
    pub fn for_region(region: Option<&str>, token: &str) -> Result<Self> {
        let region = region.unwrap_or(DEFAULT_REGION).to_lowercase();
        let host = REGIONS
            .iter()
            .find(|(name, _)| *name == region)
            .map(|(_, host)| *host)
            .ok_or_else(|| BrowserlessError::UnknownRegion(region.clone()))?;
        Self::new(host, Some(token))
    }

    /// Resolve the configured endpoint: an explicit URL wins, otherwise a
    /// token selects a hosted region. Returns `None` when no pool is configured.
    pub fn from_parts(
        url: Option<&str>,
        token: Option<&str>,
        region: Option<&str>,
    ) -> Result<Option<Self>> {
        match (url.filter(|u| !u.is_empty()), token.filter(|t| !t.is_empty())) {
            (Some(url), token) => Self::new(url, token).map(Some),
            (None, Some(token)) => Self::for_region(region, token).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Ask the pool to reap the session after `timeout` if the client vanishes.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Websocket URL for a CDP connection, with credentials in the query.
    pub fn websocket_url(&self) -> String {
        let mut url = self.base_url.clone();
        match url.scheme() {
            "http" => {
                let _ = url.set_scheme("ws");
            }
            "https" => {
                let _ = url.set_scheme("wss");
            }
            _ => {}
        }

        {
            let mut query = url.query_pairs_mut();
            if let Some(ref token) = self.token {
                query.append_pair("token", token);
            }
            if let Some(timeout) = self.session_timeout {
                query.append_pair("timeout", &timeout.as_millis().to_string());
            }
        }

        if url.query() == Some("") {
            url.set_query(None);
        }
        url.to_string()
    }

    /// Endpoint suitable for logs: host only, never the token.
    pub fn redacted_url(&self) -> String {
        format!(
            "{}://{}",
            self.base_url.scheme(),
            self.base_url.host_str().unwrap_or("?")
        )
    }
}
