//! `BrowserDriver` over the Chrome DevTools Protocol.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use browserless_client::BrowserlessError;

use super::{BrowserDriver, BrowserHandle, DriverError, PageHandle, PageProfile};

const LAUNCH_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--lang=ko-KR",
];

#[derive(Debug, Default, Clone)]
pub struct ChromiumDriver;

impl ChromiumDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn connect(&self, ws_url: &str) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| BrowserlessError::from_connect_message(&e.to_string()))?;
        Ok(Arc::new(ChromiumBrowser::spawn(browser, handler)))
    }

    async fn launch(
        &self,
        executable: &Path,
        profile: &PageProfile,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .no_sandbox()
            .window_size(profile.width, profile.height)
            .viewport(Viewport {
                width: profile.width,
                height: profile.height,
                ..Viewport::default()
            })
            .args(LAUNCH_ARGS.iter().copied())
            .build()
            .map_err(DriverError::Launch)?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        Ok(Arc::new(ChromiumBrowser::spawn(browser, handler)))
    }
}

struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// The handler stream must be polled for any command to complete.
    fn spawn(browser: Browser, mut handler: Handler) -> Self {
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });
        Self {
            browser: Mutex::new(browser),
            handler,
        }
    }
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn create_context(&self) -> Result<String, DriverError> {
        let browser = self.browser.lock().await;
        let id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(protocol)?;
        Ok(id.inner().clone())
    }

    async fn open_page(&self, context: Option<&str>) -> Result<Box<dyn PageHandle>, DriverError> {
        let mut params = CreateTargetParams::builder().url("about:blank");
        if let Some(id) = context {
            params = params.browser_context_id(BrowserContextId::new(id.to_string()));
        }
        let params = params.build().map_err(DriverError::Protocol)?;

        let browser = self.browser.lock().await;
        let page = browser.new_page(params).await.map_err(protocol)?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn dispose_context(&self, context: &str) {
        let browser = self.browser.lock().await;
        if let Err(e) = browser
            .dispose_browser_context(BrowserContextId::new(context.to_string()))
            .await
        {
            warn!(error = %e, "Failed to dispose browser context");
        }
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser close returned an error");
        }
        // Reaps the child process for launched browsers; no-op for remote ones.
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "Browser wait returned an error");
        }
        self.handler.abort();
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DriverError> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                width as i64,
                height as i64,
                1.0,
                false,
            ))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &[(&str, &str)]) -> Result<(), DriverError> {
        let map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(map),
            )))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(protocol)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        let result = self.page.evaluate(script).await.map_err(protocol)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(protocol)
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!(error = %e, "Page close returned an error");
        }
    }
}

fn protocol(e: chromiumoxide::error::CdpError) -> DriverError {
    DriverError::Protocol(e.to_string())
}
