// Trait boundaries for the batch pipeline.
//
// RankSource: smart blocks for a keyword (browser scrape in production).
// VolumeSource: best-effort keyword popularity; never fails.
// RecordStore: reads records, writes rank/volume, appends activity rows.
//
// MockRankSource, MockVolumeSource and InMemoryRecordStore in `testing`
// implement these so the orchestrator can be tested without a browser or
// database.

use std::time::Duration;

use async_trait::async_trait;

use blockrank_common::{
    ActivityLogEntry, Block, RankUpdate, Record, RecordFilter, RecordKey, Result, SearchVolume,
};

#[async_trait]
pub trait RankSource: Send + Sync {
    /// Scrape the smart blocks shown for `keyword`. Page work is bounded by
    /// `budget`, counted from the moment a browser session is ready.
    async fn blocks(&self, keyword: &str, budget: Duration) -> Result<Vec<Block>>;
}

#[async_trait]
pub trait VolumeSource: Send + Sync {
    /// Monthly search volume for `keyword`, or all-null on any failure.
    async fn volume(&self, keyword: &str, timeout: Duration) -> SearchVolume;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load_records(&self, filter: &RecordFilter) -> Result<Vec<Record>>;

    /// Write `{rank, search_volume, updated_at}` for one record.
    async fn save_rank(&self, key: &RecordKey, update: &RankUpdate) -> Result<()>;

    /// Append one audit row. Rows are never updated or deleted.
    async fn append_activity(&self, entry: &ActivityLogEntry) -> Result<()>;
}
