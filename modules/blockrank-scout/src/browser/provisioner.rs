use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use blockrank_common::{BlockRankError, Config, Result, SessionError};
use browserless_client::{BrowserlessClient, BrowserlessError};

use super::retry::{RetryMachine, RetryPolicy};
use super::{
    BrowserDriver, BrowserHandle, BrowserSession, ChromiumDriver, DriverError, PageProfile,
    SessionContext, SessionLifecycle, SessionOrigin, SessionState,
};

/// Binaries probed on `PATH` when `CHROME_BIN` is not set.
const LOCAL_BINARIES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"];

/// How long the remote pool keeps a session alive after the client vanishes.
const REMOTE_SESSION_REAP: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub remote: Option<BrowserlessClient>,
    pub local_fallback: bool,
    pub chrome_bin: Option<PathBuf>,
    /// Per-attempt bound on a remote connect.
    pub connect_timeout: Duration,
    pub launch_timeout: Duration,
    pub retry: RetryPolicy,
    pub profile: PageProfile,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            remote: None,
            local_fallback: true,
            chrome_bin: None,
            connect_timeout: Duration::from_secs(60),
            launch_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            profile: PageProfile::default(),
        }
    }
}

impl ProvisionerConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote = BrowserlessClient::from_parts(
            config.browserless_url.as_deref(),
            config.browserless_token.as_deref(),
            config.browserless_region.as_deref(),
        )
        .map_err(|e| BlockRankError::Config(e.to_string()))?
        .map(|client| client.with_session_timeout(REMOTE_SESSION_REAP));

        Ok(Self {
            remote,
            local_fallback: config.local_browser_fallback,
            chrome_bin: config.chrome_bin.as_ref().map(PathBuf::from),
            ..Self::default()
        })
    }
}

/// Hands out browser sessions: remote pool first, local browser on
/// exhaustion. One instance per process, shared by `Arc`.
pub struct BrowserProvisioner {
    config: ProvisionerConfig,
    driver: Arc<dyn BrowserDriver>,
    local_binary: OnceCell<Option<PathBuf>>,
}

impl BrowserProvisioner {
    pub fn new(config: ProvisionerConfig, driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            config,
            driver,
            local_binary: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ProvisionerConfig::from_config(config)?,
            Arc::new(ChromiumDriver::new()),
        ))
    }

    /// Skip `PATH` discovery and use `binary` (or no local browser at all).
    pub fn with_local_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.local_binary = OnceCell::new_with(Some(binary));
        self
    }

    pub fn has_remote(&self) -> bool {
        self.config.remote.is_some()
    }

    /// Local browser executable, discovered once per process.
    pub async fn local_binary(&self) -> Option<&Path> {
        self.local_binary
            .get_or_init(|| async { discover_local_binary(self.config.chrome_bin.as_deref()) })
            .await
            .as_deref()
    }

    /// Acquire a ready session. Partial handles are released before any
    /// error is returned; on success the caller owns `BrowserSession::close`.
    pub async fn acquire(&self) -> std::result::Result<BrowserSession, SessionError> {
        let mut lifecycle = SessionLifecycle::default();

        let (attempts, last_error) = match &self.config.remote {
            Some(remote) => match self.connect_remote(remote, &mut lifecycle).await {
                Ok(browser) => {
                    return Ok(self.open_session(browser, SessionOrigin::Remote, lifecycle).await)
                }
                Err(failure) => failure,
            },
            None => (0, "no remote browser pool configured".to_string()),
        };

        let binary = if self.config.local_fallback {
            self.local_binary().await
        } else {
            None
        };
        let Some(binary) = binary else {
            lifecycle.advance(SessionState::FailedFatal);
            error!(attempts, last_error = %last_error, "No browser available");
            return Err(SessionError::Unavailable {
                attempts,
                last_error,
            });
        };

        lifecycle.advance(SessionState::Connecting {
            origin: SessionOrigin::Local,
            attempt: 1,
        });
        info!(binary = %binary.display(), remote_attempts = attempts, "Launching local browser");

        let launched = tokio::time::timeout(
            self.config.launch_timeout,
            self.driver.launch(binary, &self.config.profile),
        )
        .await;
        match launched {
            Ok(Ok(browser)) => {
                lifecycle.advance(SessionState::Connected(SessionOrigin::Local));
                Ok(self.open_session(browser, SessionOrigin::Local, lifecycle).await)
            }
            Ok(Err(e)) => {
                lifecycle.advance(SessionState::FailedFatal);
                Err(SessionError::Launch(e.to_string()))
            }
            Err(_) => {
                lifecycle.advance(SessionState::FailedFatal);
                Err(SessionError::Launch(format!(
                    "timed out after {:?}",
                    self.config.launch_timeout
                )))
            }
        }
    }

    /// Connect to the remote pool with bounded retries. On failure returns
    /// the number of attempts made and the last error.
    async fn connect_remote(
        &self,
        remote: &BrowserlessClient,
        lifecycle: &mut SessionLifecycle,
    ) -> std::result::Result<Arc<dyn BrowserHandle>, (u32, String)> {
        let ws_url = remote.websocket_url();
        let endpoint = remote.redacted_url();
        let mut machine = RetryMachine::new(self.config.retry.clone());
        let mut last_error = String::new();

        while let Some(attempt) = machine.next_attempt() {
            lifecycle.advance(SessionState::Connecting {
                origin: SessionOrigin::Remote,
                attempt,
            });
            debug!(attempt, endpoint = %endpoint, "Connecting to remote browser pool");

            let error = match tokio::time::timeout(
                self.config.connect_timeout,
                self.driver.connect(&ws_url),
            )
            .await
            {
                Ok(Ok(browser)) => {
                    machine.succeed();
                    lifecycle.advance(SessionState::Connected(SessionOrigin::Remote));
                    info!(attempt, endpoint = %endpoint, "Connected to remote browser pool");
                    return Ok(browser);
                }
                Ok(Err(e)) => e,
                Err(_) => DriverError::Connect(BrowserlessError::Timeout(self.config.connect_timeout)),
            };

            let disposition = error.disposition();
            last_error = error.to_string();
            match machine.fail(disposition) {
                Some(delay) => {
                    warn!(
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        kind = ?error.failure_kind(),
                        error = %error,
                        "Remote browser connect failed, retrying"
                    );
                    lifecycle.advance(SessionState::Retrying { attempt });
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(attempt, ?disposition, kind = ?error.failure_kind(), error = %error, "Giving up on remote browser pool");
                }
            }
        }

        Err((machine.attempts(), last_error))
    }

    async fn open_session(
        &self,
        browser: Arc<dyn BrowserHandle>,
        origin: SessionOrigin,
        lifecycle: SessionLifecycle,
    ) -> BrowserSession {
        let context = match browser.create_context().await {
            Ok(id) => SessionContext::Fresh(id),
            Err(e) => {
                warn!(error = %e, "Browser context creation failed, using default context");
                SessionContext::Shared
            }
        };
        BrowserSession::new(browser, context, origin, self.config.profile.clone(), lifecycle)
    }
}

fn discover_local_binary(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return match which::which(path) {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Configured CHROME_BIN is not executable");
                None
            }
        };
    }
    let found = LOCAL_BINARIES
        .iter()
        .find_map(|name| which::which(name).ok());
    debug!(found = ?found, "Local browser discovery");
    found
}
