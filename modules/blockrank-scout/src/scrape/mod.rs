//! Smart block scraping.
//!
//! `SmartBlockScraper` drives one browser session per keyword: navigate,
//! scroll until the page stops growing, wait for a content root, then hand
//! the captured HTML to the pure extractors in `extract`.

pub mod extract;
pub mod selectors;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use blockrank_common::{Block, BlockRankError, Result, Timeouts};

use crate::browser::{BrowserProvisioner, BrowserSession, PageHandle, SessionOrigin};
use crate::infra::Deadline;
use crate::traits::RankSource;

pub use extract::{extract_blocks, MAX_BLOCKS};

const SEARCH_ENDPOINT: &str = "https://search.naver.com/search.naver";

/// Scrolls to the bottom and reports the document height.
pub(crate) const SCROLL_SCRIPT: &str =
    "(() => { window.scrollTo(0, document.body.scrollHeight); return document.body.scrollHeight; })()";

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Fixed navigation bound; otherwise chosen by where the browser runs.
    pub navigation_timeout: Option<Duration>,
    pub remote_navigation_timeout: Duration,
    pub local_navigation_timeout: Duration,
    pub selector_wait: Duration,
    /// Budget kept back from navigation, scrolling and the selector wait so
    /// the DOM can still be read.
    pub capture_reserve: Duration,
    pub probe_interval: Duration,
    pub max_scrolls: u32,
    pub scroll_pause: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: None,
            remote_navigation_timeout: Duration::from_secs(90),
            local_navigation_timeout: Duration::from_secs(60),
            selector_wait: Duration::from_secs(10),
            capture_reserve: Duration::from_secs(3),
            probe_interval: Duration::from_millis(250),
            max_scrolls: 12,
            scroll_pause: Duration::from_millis(600),
        }
    }
}

impl ScraperConfig {
    pub fn from_timeouts(timeouts: &Timeouts) -> Self {
        Self {
            navigation_timeout: timeouts.navigation,
            ..Self::default()
        }
    }

    pub fn navigation_timeout(&self, origin: SessionOrigin) -> Duration {
        self.navigation_timeout.unwrap_or(match origin {
            SessionOrigin::Remote => self.remote_navigation_timeout,
            SessionOrigin::Local => self.local_navigation_timeout,
        })
    }
}

/// Results page URL for `keyword`.
pub fn search_url(keyword: &str) -> Result<Url> {
    Url::parse_with_params(SEARCH_ENDPOINT, &[("where", "nexearch"), ("query", keyword)])
        .map_err(|e| BlockRankError::Scrape(format!("invalid search URL: {e}")))
}

pub struct SmartBlockScraper {
    provisioner: Arc<BrowserProvisioner>,
    config: ScraperConfig,
}

impl SmartBlockScraper {
    pub fn new(provisioner: Arc<BrowserProvisioner>, config: ScraperConfig) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    async fn scrape_session(
        &self,
        session: &BrowserSession,
        keyword: &str,
        deadline: Deadline,
    ) -> Result<Vec<Block>> {
        let page = match deadline.run(session.new_page()).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(BlockRankError::Scrape(format!("failed to open page: {e}"))),
            Err(_) => return Err(BlockRankError::Scrape("timed out opening page".to_string())),
        };

        let result = self
            .scrape_page(page.as_ref(), session.origin(), keyword, deadline)
            .await;
        page.close().await;
        result
    }

    async fn scrape_page(
        &self,
        page: &dyn PageHandle,
        origin: SessionOrigin,
        keyword: &str,
        deadline: Deadline,
    ) -> Result<Vec<Block>> {
        let url = search_url(keyword)?;
        let working = deadline.reserve(self.config.capture_reserve);
        let navigation = working.cap(self.config.navigation_timeout(origin));
        let bound = navigation.remaining();

        match navigation.run(page.goto(url.as_str())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(BlockRankError::Scrape(format!("navigation failed: {e}"))),
            Err(_) => {
                return Err(BlockRankError::Scrape(format!(
                    "navigation timed out after {bound:?}"
                )))
            }
        }

        self.scroll(page, working).await;

        if let Err(e) = self.wait_for_content(page, working).await {
            warn!(keyword, error = %e, "Content root never appeared, reading current DOM");
        }

        let html = match deadline.run(page.content()).await {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => return Err(BlockRankError::Scrape(format!("failed to read DOM: {e}"))),
            Err(_) => return Err(BlockRankError::Scrape("budget exhausted before DOM capture".to_string())),
        };

        let blocks = extract_blocks(&html);
        info!(
            keyword,
            blocks = blocks.len(),
            items = blocks.iter().map(|b| b.items.len()).sum::<usize>(),
            "Scraped smart blocks"
        );
        Ok(blocks)
    }

    /// Scroll to the bottom until the height stops changing. Best-effort.
    async fn scroll(&self, page: &dyn PageHandle, deadline: Deadline) {
        let mut last_height: Option<u64> = None;

        for iteration in 1..=self.config.max_scrolls {
            let height = match deadline.run(page.evaluate(SCROLL_SCRIPT)).await {
                Ok(Ok(value)) => value.as_f64().map(|h| h as u64),
                Ok(Err(e)) => {
                    debug!(error = %e, "Scroll script failed");
                    return;
                }
                Err(_) => return,
            };

            if height.is_some() && height == last_height {
                debug!(iteration, height, "Page height stabilized");
                return;
            }
            last_height = height;

            if !deadline.pause(self.config.scroll_pause).await {
                return;
            }
        }
        debug!(max = self.config.max_scrolls, "Scroll cap reached");
    }

    /// Poll until any content root is present or the selector wait ends.
    async fn wait_for_content(&self, page: &dyn PageHandle, deadline: Deadline) -> Result<()> {
        let wait = deadline.cap(self.config.selector_wait);
        let probe = selectors::content_probe_script();
        let timed_out = || BlockRankError::SelectorTimeout(self.config.selector_wait);

        loop {
            match wait.run(page.evaluate(&probe)).await {
                Ok(Ok(serde_json::Value::Bool(true))) => return Ok(()),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!(error = %e, "Content probe failed"),
                Err(_) => return Err(timed_out()),
            }
            if !wait.pause(self.config.probe_interval).await {
                return Err(timed_out());
            }
        }
    }
}

#[async_trait]
impl RankSource for SmartBlockScraper {
    async fn blocks(&self, keyword: &str, budget: Duration) -> Result<Vec<Block>> {
        let session = self.provisioner.acquire().await?;
        debug!(keyword, origin = ?session.origin(), "Browser session ready");

        let result = self
            .scrape_session(&session, keyword, Deadline::after(budget))
            .await;
        session.close().await;
        result
    }
}
