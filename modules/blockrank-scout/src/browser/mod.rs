//! Headless browser sessions.
//!
//! `BrowserProvisioner` hands out `BrowserSession`s backed by a remote pool
//! or a local Chromium. Everything below the provisioner talks to the browser
//! through the `BrowserDriver` / `BrowserHandle` / `PageHandle` traits so the
//! retry and fallback logic can be exercised without Chrome.

pub mod chromium;
pub mod provisioner;
pub mod retry;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use browserless_client::{BrowserlessError, FailureKind};

pub use chromium::ChromiumDriver;
pub use provisioner::{BrowserProvisioner, ProvisionerConfig};
pub use retry::{Disposition, RetryMachine, RetryPolicy, RetryState};

/// Stable desktop user agent sent on every page.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Viewport and identity applied to every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProfile {
    pub width: u32,
    pub height: u32,
    pub user_agent: String,
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Connect(#[from] BrowserlessError),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether the remote pool is worth another connect attempt.
    pub fn disposition(&self) -> Disposition {
        match self {
            DriverError::Connect(e) if !e.is_retryable() => Disposition::Fatal,
            _ => Disposition::Retryable,
        }
    }

    /// Rate limited, network/timeout, or anything else.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DriverError::Connect(e) => e.kind(),
            _ => FailureKind::Other,
        }
    }
}

/// Where a session's browser lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Remote,
    Local,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Attach to a remote browser over CDP.
    async fn connect(&self, ws_url: &str) -> Result<Arc<dyn BrowserHandle>, DriverError>;

    /// Start a local headless browser process.
    async fn launch(
        &self,
        executable: &Path,
        profile: &PageProfile,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError>;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Create an isolated context, returning its id.
    async fn create_context(&self) -> Result<String, DriverError>;

    /// Open a blank page in `context`, or the default context when `None`.
    async fn open_page(&self, context: Option<&str>) -> Result<Box<dyn PageHandle>, DriverError>;

    async fn dispose_context(&self, context: &str);

    async fn close(&self);
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DriverError>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError>;

    async fn set_extra_headers(&self, headers: &[(&str, &str)]) -> Result<(), DriverError>;

    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Evaluate a script and return its JSON value (`Null` for undefined).
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String, DriverError>;

    async fn close(&self);
}

// --- Session lifecycle ---

/// `Idle → Connecting → {Connected | Retrying → Connecting | FailedFatal} → Active → Closed`.
///
/// Falling back from the remote pool to a local browser is a
/// `Connecting → Connecting` edge with a new origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting { origin: SessionOrigin, attempt: u32 },
    Retrying { attempt: u32 },
    Connected(SessionOrigin),
    Active,
    Closed,
    FailedFatal,
}

impl SessionState {
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting { .. })
                | (Idle, FailedFatal)
                | (Connecting { .. }, Connected(_))
                | (Connecting { .. }, Retrying { .. })
                | (Connecting { .. }, Connecting { .. })
                | (Connecting { .. }, FailedFatal)
                | (Retrying { .. }, Connecting { .. })
                | (Connected(_), Active)
                | (Connected(_), Closed)
                | (Active, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::FailedFatal)
    }
}

/// Transition history for one acquisition.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    history: Vec<SessionState>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self {
            history: vec![SessionState::Idle],
        }
    }
}

impl SessionLifecycle {
    pub fn current(&self) -> SessionState {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionState::Idle)
    }

    pub fn advance(&mut self, next: SessionState) {
        let current = self.current();
        if current.can_transition_to(&next) {
            debug!(from = ?current, to = ?next, "Browser session transition");
        } else {
            warn!(from = ?current, to = ?next, "Unexpected browser session transition");
        }
        self.history.push(next);
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }
}

/// Which context pages are opened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionContext {
    Fresh(String),
    /// Context creation failed; pages share the browser's default context
    /// and get the user agent through a header override as well.
    Shared,
}

/// An acquired browser plus its context. The holder must call `close`.
pub struct BrowserSession {
    browser: Arc<dyn BrowserHandle>,
    context: SessionContext,
    origin: SessionOrigin,
    profile: PageProfile,
    lifecycle: SessionLifecycle,
}

impl BrowserSession {
    pub(crate) fn new(
        browser: Arc<dyn BrowserHandle>,
        context: SessionContext,
        origin: SessionOrigin,
        profile: PageProfile,
        mut lifecycle: SessionLifecycle,
    ) -> Self {
        lifecycle.advance(SessionState::Active);
        Self {
            browser,
            context,
            origin,
            profile,
            lifecycle,
        }
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// Open a page with the session's viewport and user agent applied. The
    /// page is closed again if preparing it fails.
    pub async fn new_page(&self) -> Result<Box<dyn PageHandle>, DriverError> {
        let context = match &self.context {
            SessionContext::Fresh(id) => Some(id.as_str()),
            SessionContext::Shared => None,
        };
        let page = self.browser.open_page(context).await?;

        if let Err(e) = self.prepare_page(page.as_ref()).await {
            page.close().await;
            return Err(e);
        }
        Ok(page)
    }

    async fn prepare_page(&self, page: &dyn PageHandle) -> Result<(), DriverError> {
        page.set_viewport(self.profile.width, self.profile.height)
            .await?;
        page.set_user_agent(&self.profile.user_agent).await?;
        if self.context == SessionContext::Shared {
            page.set_extra_headers(&[("User-Agent", self.profile.user_agent.as_str())])
                .await?;
        }
        Ok(())
    }

    /// Dispose the context and close the browser.
    pub async fn close(mut self) {
        if let SessionContext::Fresh(ref id) = self.context {
            self.browser.dispose_context(id).await;
        }
        self.browser.close().await;
        self.lifecycle.advance(SessionState::Closed);
    }
}
