//! Batch rank refresh.
//!
//! Records are processed one at a time. For each record the smart-block
//! scrape and the volume lookup run concurrently, the record is matched
//! against the scraped entries, and the result is persisted with one audit
//! row. A failure in one record never stops the others; only a browser pool
//! that is gone for good aborts the run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};
use typed_builder::TypedBuilder;

use blockrank_common::{
    entries_from_blocks, ActivityLogEntry, Actor, Config, RankUpdate, Record, RecordFilter,
    Result, SearchVolume, Timeouts, UpdateOutcome, ACTION_RANK_UPDATED,
};

use crate::browser::BrowserProvisioner;
use crate::matcher::{find_match, MatchResult};
use crate::scrape::{ScraperConfig, SmartBlockScraper};
use crate::traits::{RankSource, RecordStore, VolumeSource};
use crate::volume::SearchAdVolume;

/// Long-lived collaborators of the orchestrator.
#[derive(Clone, TypedBuilder)]
pub struct BatchDeps {
    pub ranks: Arc<dyn RankSource>,
    pub volumes: Arc<dyn VolumeSource>,
    pub store: Arc<dyn RecordStore>,
    #[builder(default)]
    pub timeouts: Timeouts,
}

impl BatchDeps {
    /// Production wiring: browser scraper plus search-ads volume.
    pub fn from_config(config: &Config, store: Arc<dyn RecordStore>) -> Result<Self> {
        let provisioner = Arc::new(BrowserProvisioner::from_config(config)?);
        let scraper =
            SmartBlockScraper::new(provisioner, ScraperConfig::from_timeouts(&config.timeouts));

        Ok(Self::builder()
            .ranks(Arc::new(scraper))
            .volumes(Arc::new(SearchAdVolume::from_config(config)))
            .store(store)
            .timeouts(config.timeouts.clone())
            .build())
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Records found in a smart block.
    pub ranked: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[UpdateOutcome]) -> Self {
        Self {
            total: outcomes.len(),
            succeeded: outcomes.iter().filter(|o| o.success).count(),
            ranked: outcomes.iter().filter(|o| o.rank.is_some()).count(),
        }
    }
}

pub struct BatchUpdater {
    deps: BatchDeps,
}

impl BatchUpdater {
    pub fn new(deps: BatchDeps) -> Self {
        Self { deps }
    }

    pub fn from_config(config: &Config, store: Arc<dyn RecordStore>) -> Result<Self> {
        Ok(Self::new(BatchDeps::from_config(config, store)?))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.deps.store
    }

    /// Load the records selected by `filter` and refresh them.
    pub async fn refresh(&self, filter: &RecordFilter, actor: &Actor) -> Result<Vec<UpdateOutcome>> {
        let records = self.deps.store.load_records(filter).await?;
        self.run(&records, actor).await
    }

    /// Refresh `records` in order. Returns one outcome per record, or the
    /// fatal session error that stopped the run.
    pub async fn run(&self, records: &[Record], actor: &Actor) -> Result<Vec<UpdateOutcome>> {
        let budget = self.scrape_budget(records.len());
        let delay = self.deps.timeouts.inter_record_delay;
        let mut outcomes = Vec::with_capacity(records.len());

        info!(
            records = records.len(),
            actor = %actor.id,
            budget_secs = budget.as_secs(),
            "Starting rank refresh"
        );

        for (i, record) in records.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let span = info_span!("record", id = %record.id, keyword = %record.keyword);
            let result = AssertUnwindSafe(
                self.process(record, actor, budget)
                    .instrument(span.clone()),
            )
            .catch_unwind()
            .await;

            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) if e.is_fatal() => {
                    span.in_scope(|| error!(error = %e, "No browser available, aborting run"));
                    return Err(e);
                }
                Ok(Err(e)) => {
                    span.in_scope(|| warn!(error = %e, "Record failed"));
                    UpdateOutcome::failed(record, e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    span.in_scope(|| error!(panic = %message, "Record processing panicked"));
                    UpdateOutcome::failed(record, format!("panic: {message}"))
                }
            };
            outcomes.push(outcome);
        }

        let summary = BatchSummary::from_outcomes(&outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.total - summary.succeeded,
            ranked = summary.ranked,
            "Rank refresh complete"
        );
        Ok(outcomes)
    }

    fn scrape_budget(&self, records: usize) -> Duration {
        if records <= 1 {
            self.deps.timeouts.scrape_single
        } else {
            self.deps.timeouts.scrape_batch
        }
    }

    async fn process(&self, record: &Record, actor: &Actor, budget: Duration) -> Result<UpdateOutcome> {
        let (blocks, volume) = tokio::join!(
            self.deps.ranks.blocks(&record.keyword, budget),
            self.deps.volumes.volume(&record.keyword, self.deps.timeouts.volume),
        );

        let blocks = match blocks {
            Ok(blocks) => blocks,
            Err(e) if e.degrades_to_empty() => {
                warn!(error = %e, "Scrape failed, treating as not exposed");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let entries = entries_from_blocks(&record.keyword, &blocks);
        let matched = find_match(&entries, record);
        let rank = matched.as_ref().map(|m| m.entry.rank);

        let update = RankUpdate {
            rank,
            search_volume: volume.total,
            updated_at: Utc::now(),
        };
        self.deps.store.save_rank(&record.key(), &update).await?;

        let entry = ActivityLogEntry {
            action: ACTION_RANK_UPDATED.to_string(),
            record_id: record.id.clone(),
            keyword: record.keyword.clone(),
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            metadata: activity_metadata(matched.as_ref(), &volume, blocks.len(), entries.len()),
            timestamp: update.updated_at,
        };
        if let Err(e) = self.deps.store.append_activity(&entry).await {
            warn!(error = %e, "Failed to append activity log");
        }

        match &matched {
            Some(m) => info!(
                rank = m.entry.rank,
                block = %m.entry.block_title,
                identifier = m.identifier.kind.as_str(),
                match_kind = m.kind.as_str(),
                search_volume = volume.total,
                "Rank updated"
            ),
            None => info!(
                entries = entries.len(),
                search_volume = volume.total,
                "Not exposed"
            ),
        }

        Ok(UpdateOutcome {
            id: record.id.clone(),
            keyword: record.keyword.clone(),
            rank,
            search_volume: volume.total,
            nickname: matched.as_ref().and_then(|m| m.entry.nickname.clone()),
            link: matched.as_ref().map(|m| m.entry.link.clone()),
            success: true,
            error: None,
        })
    }
}

fn activity_metadata(
    matched: Option<&MatchResult<'_>>,
    volume: &SearchVolume,
    blocks: usize,
    entries: usize,
) -> serde_json::Value {
    json!({
        "rank": matched.map(|m| m.entry.rank),
        "searchVolume": volume.total,
        "pcVolume": volume.pc,
        "mobileVolume": volume.mobile,
        "matchedIdentifier": matched.map(|m| m.identifier.token.as_str()),
        "identifierKind": matched.map(|m| m.identifier.kind.as_str()),
        "matchKind": matched.map(|m| m.kind.as_str()),
        "blockTitle": matched.map(|m| m.entry.block_title.as_str()),
        "nickname": matched.and_then(|m| m.entry.nickname.as_deref()),
        "link": matched.map(|m| m.entry.link.as_str()),
        "blocks": blocks,
        "entries": entries,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(rank: Option<u32>, success: bool) -> UpdateOutcome {
        UpdateOutcome {
            id: "a".into(),
            keyword: "k".into(),
            rank,
            search_volume: None,
            nickname: None,
            link: None,
            success,
            error: None,
        }
    }

    #[test]
    fn summary_counts() {
        let summary = BatchSummary::from_outcomes(&[
            outcome(Some(2), true),
            outcome(None, true),
            outcome(None, false),
        ]);
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                succeeded: 2,
                ranked: 1
            }
        );
    }

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn unmatched_metadata_is_null() {
        let meta = activity_metadata(None, &SearchVolume::unknown(), 2, 7);
        assert!(meta["rank"].is_null());
        assert!(meta["searchVolume"].is_null());
        assert_eq!(meta["entries"], 7);
    }
}
