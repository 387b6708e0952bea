// Test mocks for the rank pipeline.
//
// Mocks matching the trait boundaries:
// - MockDriver / MockBrowser (BrowserDriver, BrowserHandle, PageHandle): scripted CDP
// - MockRankSource (RankSource): keyword→blocks, with injectable failures
// - MockVolumeSource (VolumeSource): keyword→volume, optional delay
// - InMemoryRecordStore (RecordStore): records, saved ranks, activity rows
//
// Plus helpers for constructing records, blocks and items.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use blockrank_common::{
    ActivityLogEntry, Block, BlockRankError, Item, RankUpdate, Record, RecordFilter, RecordKey,
    Result, SearchVolume, SessionError,
};

use crate::browser::{BrowserDriver, BrowserHandle, DriverError, PageHandle, PageProfile};
use crate::scrape::SCROLL_SCRIPT;
use crate::traits::{RankSource, RecordStore, VolumeSource};

// ---------------------------------------------------------------------------
// MockDriver
// ---------------------------------------------------------------------------

/// Scripted driver. Connect failures are consumed in order; once they run
/// out, connects succeed with the shared `MockBrowser`.
pub struct MockDriver {
    browser: Arc<MockBrowser>,
    connect_failures: Mutex<VecDeque<DriverError>>,
    connect_times: Mutex<Vec<Instant>>,
    hang_connects: bool,
    fail_launch: bool,
    launches: AtomicU32,
}

impl MockDriver {
    pub fn new(browser: MockBrowser) -> Self {
        Self {
            browser: Arc::new(browser),
            connect_failures: Mutex::new(VecDeque::new()),
            connect_times: Mutex::new(Vec::new()),
            hang_connects: false,
            fail_launch: false,
            launches: AtomicU32::new(0),
        }
    }

    pub fn failing_connects(self, errors: impl IntoIterator<Item = DriverError>) -> Self {
        self.connect_failures.lock().unwrap().extend(errors);
        self
    }

    /// Connects never resolve.
    pub fn hanging_connects(mut self) -> Self {
        self.hang_connects = true;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn browser(&self) -> &Arc<MockBrowser> {
        &self.browser
    }

    pub fn connect_count(&self) -> usize {
        self.connect_times.lock().unwrap().len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn connect(&self, _ws_url: &str) -> std::result::Result<Arc<dyn BrowserHandle>, DriverError> {
        self.connect_times.lock().unwrap().push(Instant::now());
        if self.hang_connects {
            std::future::pending::<()>().await;
        }
        let failure = self.connect_failures.lock().unwrap().pop_front();
        match failure {
            Some(e) => Err(e),
            None => Ok(self.browser.clone()),
        }
    }

    async fn launch(
        &self,
        _executable: &Path,
        _profile: &PageProfile,
    ) -> std::result::Result<Arc<dyn BrowserHandle>, DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(DriverError::Launch("spawn failed".to_string()));
        }
        Ok(self.browser.clone())
    }
}

// ---------------------------------------------------------------------------
// MockBrowser
// ---------------------------------------------------------------------------

/// One in-memory browser. Every page it opens shares the same scripted
/// document and appends to a shared log.
pub struct MockBrowser {
    inner: Arc<Mutex<MockBrowserInner>>,
}

struct MockBrowserInner {
    html: String,
    fail_contexts: bool,
    fail_goto: bool,
    hang_goto: bool,
    goto_delay: Duration,
    content_delay: Duration,
    content_ready: bool,
    scroll_heights: VecDeque<u64>,
    last_height: u64,
    endless_scroll: bool,
    scrolls: u32,
    contexts: u32,
    open_pages: i32,
    closed: bool,
    log: Vec<String>,
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockBrowserInner {
                html: "<html><body></body></html>".to_string(),
                fail_contexts: false,
                fail_goto: false,
                hang_goto: false,
                goto_delay: Duration::ZERO,
                content_delay: Duration::ZERO,
                content_ready: true,
                scroll_heights: VecDeque::new(),
                last_height: 1000,
                endless_scroll: false,
                scrolls: 0,
                contexts: 0,
                open_pages: 0,
                closed: false,
                log: Vec::new(),
            })),
        }
    }

    pub fn with_html(self, html: &str) -> Self {
        self.inner.lock().unwrap().html = html.to_string();
        self
    }

    pub fn failing_contexts(self) -> Self {
        self.inner.lock().unwrap().fail_contexts = true;
        self
    }

    pub fn failing_goto(self) -> Self {
        self.inner.lock().unwrap().fail_goto = true;
        self
    }

    /// Navigation never completes.
    pub fn hanging_goto(self) -> Self {
        self.inner.lock().unwrap().hang_goto = true;
        self
    }

    /// Navigation completes after `delay`.
    pub fn slow_goto(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().goto_delay = delay;
        self
    }

    /// Reading the DOM takes a round trip of `delay`.
    pub fn slow_content(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().content_delay = delay;
        self
    }

    /// The content probe always reports no content root.
    pub fn content_never_ready(self) -> Self {
        self.inner.lock().unwrap().content_ready = false;
        self
    }

    /// Heights reported by successive scrolls; the last one repeats.
    pub fn scroll_heights(self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.inner.lock().unwrap().scroll_heights.extend(heights);
        self
    }

    /// Every scroll reveals more content.
    pub fn endless_scroll(self) -> Self {
        self.inner.lock().unwrap().endless_scroll = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn open_pages(&self) -> i32 {
        self.inner.lock().unwrap().open_pages
    }

    pub fn scroll_count(&self) -> u32 {
        self.inner.lock().unwrap().scrolls
    }

    pub fn page_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    fn record(&self, line: String) {
        self.inner.lock().unwrap().log.push(line);
    }
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn create_context(&self) -> std::result::Result<String, DriverError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_contexts {
            return Err(DriverError::Protocol("Target.createBrowserContext not allowed".to_string()));
        }
        inner.contexts += 1;
        let id = format!("ctx-{}", inner.contexts);
        inner.log.push(format!("context {id}"));
        Ok(id)
    }

    async fn open_page(
        &self,
        context: Option<&str>,
    ) -> std::result::Result<Box<dyn PageHandle>, DriverError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open_pages += 1;
        inner.log.push(format!("open page in {}", context.unwrap_or("default")));
        Ok(Box::new(MockPage {
            browser: self.inner.clone(),
        }))
    }

    async fn dispose_context(&self, context: &str) {
        self.record(format!("dispose {context}"));
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.log.push("close browser".to_string());
    }
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

pub struct MockPage {
    browser: Arc<Mutex<MockBrowserInner>>,
}

impl MockPage {
    fn record(&self, line: String) {
        self.browser.lock().unwrap().log.push(line);
    }
}

#[async_trait]
impl PageHandle for MockPage {
    async fn set_viewport(&self, width: u32, height: u32) -> std::result::Result<(), DriverError> {
        self.record(format!("viewport {width}x{height}"));
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> std::result::Result<(), DriverError> {
        self.record(format!("user_agent {user_agent}"));
        Ok(())
    }

    async fn set_extra_headers(
        &self,
        headers: &[(&str, &str)],
    ) -> std::result::Result<(), DriverError> {
        for (name, value) in headers {
            self.record(format!("header {name}: {value}"));
        }
        Ok(())
    }

    async fn goto(&self, url: &str) -> std::result::Result<(), DriverError> {
        let (fail, hang, delay) = {
            let mut inner = self.browser.lock().unwrap();
            inner.log.push(format!("goto {url}"));
            (inner.fail_goto, inner.hang_goto, inner.goto_delay)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(DriverError::Protocol("net::ERR_CONNECTION_RESET".to_string()));
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> std::result::Result<serde_json::Value, DriverError> {
        let mut inner = self.browser.lock().unwrap();
        if script == SCROLL_SCRIPT {
            inner.scrolls += 1;
            let height = if inner.endless_scroll {
                inner.last_height + 800
            } else {
                inner.scroll_heights.pop_front().unwrap_or(inner.last_height)
            };
            inner.last_height = height;
            return Ok(serde_json::json!(height));
        }
        Ok(serde_json::Value::Bool(inner.content_ready))
    }

    async fn content(&self) -> std::result::Result<String, DriverError> {
        let (html, delay) = {
            let inner = self.browser.lock().unwrap();
            (inner.html.clone(), inner.content_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(html)
    }

    async fn close(&self) {
        let mut inner = self.browser.lock().unwrap();
        inner.open_pages -= 1;
        inner.log.push("close page".to_string());
    }
}

// ---------------------------------------------------------------------------
// MockRankSource
// ---------------------------------------------------------------------------

/// How a keyword's scrape should misbehave.
#[derive(Debug, Clone)]
pub enum ScrapeFailure {
    /// Degrades to "not exposed".
    Scrape(String),
    /// Fatal session error: pool exhausted, no local browser.
    Unavailable,
    /// A local browser that failed to start: fails the record only.
    Other(String),
    Panic,
}

/// Keyword→blocks map. Unknown keywords return no blocks.
#[derive(Default)]
pub struct MockRankSource {
    blocks: HashMap<String, Vec<Block>>,
    failures: HashMap<String, ScrapeFailure>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl MockRankSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_keyword(mut self, keyword: &str, blocks: Vec<Block>) -> Self {
        self.blocks.insert(keyword.to_string(), blocks);
        self
    }

    pub fn failing(mut self, keyword: &str, failure: ScrapeFailure) -> Self {
        self.failures.insert(keyword.to_string(), failure);
        self
    }

    /// `(keyword, budget)` per call, in call order.
    pub fn calls(&self) -> Vec<(String, Duration)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RankSource for MockRankSource {
    async fn blocks(&self, keyword: &str, budget: Duration) -> Result<Vec<Block>> {
        self.calls
            .lock()
            .unwrap()
            .push((keyword.to_string(), budget));

        match self.failures.get(keyword) {
            Some(ScrapeFailure::Scrape(msg)) => Err(BlockRankError::Scrape(msg.clone())),
            Some(ScrapeFailure::Unavailable) => Err(SessionError::Unavailable {
                attempts: 5,
                last_error: "429 Too Many Requests".to_string(),
            }
            .into()),
            Some(ScrapeFailure::Other(msg)) => Err(SessionError::Launch(msg.clone()).into()),
            Some(ScrapeFailure::Panic) => panic!("scraper blew up on {keyword}"),
            None => Ok(self.blocks.get(keyword).cloned().unwrap_or_default()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockVolumeSource
// ---------------------------------------------------------------------------

/// Keyword→volume map. Honors the timeout like the real fetcher: a delay
/// longer than the timeout yields the unknown volume.
#[derive(Default)]
pub struct MockVolumeSource {
    volumes: HashMap<String, SearchVolume>,
    delay: Option<Duration>,
}

impl MockVolumeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_keyword(mut self, keyword: &str, total: u64) -> Self {
        self.volumes.insert(
            keyword.to_string(),
            SearchVolume {
                total: Some(total),
                pc: Some(total / 4),
                mobile: Some(total - total / 4),
            },
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl VolumeSource for MockVolumeSource {
    async fn volume(&self, keyword: &str, timeout: Duration) -> SearchVolume {
        let lookup = async {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.volumes.get(keyword).copied().unwrap_or_default()
        };
        tokio::time::timeout(timeout, lookup)
            .await
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// InMemoryRecordStore
// ---------------------------------------------------------------------------

/// Stored rank/volume for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRank {
    pub rank: Option<u32>,
    pub search_volume: Option<u64>,
    pub writes: u32,
}

pub struct InMemoryRecordStore {
    inner: Mutex<InMemoryInner>,
}

struct InMemoryInner {
    records: Vec<Record>,
    ranks: HashMap<RecordKey, StoredRank>,
    activity: Vec<ActivityLogEntry>,
    fail_saves_for: Vec<String>,
    fail_loads: bool,
    fail_activity: bool,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryRecordStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            inner: Mutex::new(InMemoryInner {
                records,
                ranks: HashMap::new(),
                activity: Vec::new(),
                fail_saves_for: Vec::new(),
                fail_loads: false,
                fail_activity: false,
            }),
        }
    }

    /// `save_rank` fails for every record with this id.
    pub fn failing_saves_for(self, id: &str) -> Self {
        self.inner.lock().unwrap().fail_saves_for.push(id.to_string());
        self
    }

    pub fn failing_loads(self) -> Self {
        self.inner.lock().unwrap().fail_loads = true;
        self
    }

    pub fn failing_activity(self) -> Self {
        self.inner.lock().unwrap().fail_activity = true;
        self
    }

    /// Seed a stored volume, as if from an earlier run.
    pub fn with_volume(self, id: &str, keyword: &str, volume: u64) -> Self {
        self.inner.lock().unwrap().ranks.insert(
            key(id, keyword),
            StoredRank {
                search_volume: Some(volume),
                ..StoredRank::default()
            },
        );
        self
    }

    pub fn stored(&self, id: &str, keyword: &str) -> Option<StoredRank> {
        self.inner.lock().unwrap().ranks.get(&key(id, keyword)).cloned()
    }

    pub fn activity(&self) -> Vec<ActivityLogEntry> {
        self.inner.lock().unwrap().activity.clone()
    }
}

fn key(id: &str, keyword: &str) -> RecordKey {
    RecordKey {
        id: id.to_string(),
        keyword: keyword.to_string(),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_loads {
            return Err(BlockRankError::Persist("connection refused".to_string()));
        }
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(inner
            .records
            .iter()
            .filter(|r| filter.id.as_ref().is_none_or(|id| &r.id == id))
            .filter(|r| filter.keyword.as_ref().is_none_or(|kw| &r.keyword == kw))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_rank(&self, key: &RecordKey, update: &RankUpdate) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_saves_for.contains(&key.id) {
            return Err(BlockRankError::Persist(format!("write rejected for {}", key.id)));
        }
        let stored = inner.ranks.entry(key.clone()).or_default();
        stored.rank = update.rank;
        if update.search_volume.is_some() {
            stored.search_volume = update.search_volume;
        }
        stored.writes += 1;
        Ok(())
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_activity {
            return Err(BlockRankError::Persist("activity_logs unavailable".to_string()));
        }
        inner.activity.push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn record(id: &str, keyword: &str) -> Record {
    Record {
        id: id.to_string(),
        keyword: keyword.to_string(),
        link: None,
        title: None,
        author: None,
        linked_accounts: Vec::new(),
    }
}

/// An item whose author profile is `blog.naver.com/<handle>`.
pub fn blog_item(title: &str, handle: &str, nickname: &str) -> Item {
    Item {
        title: title.to_string(),
        content: String::new(),
        link: format!("https://blog.naver.com/{handle}/223000000001"),
        profile_link: format!("https://blog.naver.com/{handle}"),
        external_id: Some(handle.to_string()),
        nickname: Some(nickname.to_string()),
    }
}

pub fn block(title: &str, items: Vec<Item>) -> Block {
    Block {
        title: title.to_string(),
        items,
    }
}
