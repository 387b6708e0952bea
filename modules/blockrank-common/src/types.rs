use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Stored records ---

/// A tracked "keyword + author" pair owned by the record store.
///
/// Identity is `(id, keyword)`: the same account handle may be tracked under
/// many keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Account handle of the tracked author.
    pub id: String,
    pub keyword: String,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub linked_accounts: Vec<String>,
}

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            id: self.id.clone(),
            keyword: self.keyword.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: String,
    pub keyword: String,
}

/// Caller-supplied selection of records for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub id: Option<String>,
    pub keyword: Option<String>,
    pub limit: Option<u32>,
}

/// The only fields this pipeline writes back to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankUpdate {
    pub rank: Option<u32>,
    /// `None` leaves the stored volume untouched.
    pub search_volume: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

// --- Scraped results ---

/// One result inside a smart block, as read from the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub title: String,
    pub content: String,
    pub link: String,
    pub profile_link: String,
    pub external_id: Option<String>,
    pub nickname: Option<String>,
}

/// A titled cluster of result items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub title: String,
    pub items: Vec<Item>,
}

/// A scraped item flattened with its keyword and in-block position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedEntry {
    pub keyword: String,
    pub external_id: Option<String>,
    pub title: String,
    pub link: String,
    pub profile_link: Option<String>,
    /// 1-based position within the containing block.
    pub rank: u32,
    pub nickname: Option<String>,
    pub snippet: Option<String>,
    pub block_title: String,
}

impl ScrapedEntry {
    pub fn from_item(keyword: &str, block_title: &str, rank: u32, item: &Item) -> Self {
        Self {
            keyword: keyword.to_string(),
            external_id: item.external_id.clone(),
            title: item.title.clone(),
            link: item.link.clone(),
            profile_link: non_empty(&item.profile_link),
            rank,
            nickname: item.nickname.clone(),
            snippet: non_empty(&item.content),
            block_title: block_title.to_string(),
        }
    }
}

/// Flatten blocks into entries, ranking each item by its position in its block.
pub fn entries_from_blocks(keyword: &str, blocks: &[Block]) -> Vec<ScrapedEntry> {
    blocks
        .iter()
        .flat_map(|block| {
            block.items.iter().enumerate().map(move |(i, item)| {
                ScrapedEntry::from_item(keyword, &block.title, i as u32 + 1, item)
            })
        })
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// --- Search volume ---

/// Monthly search volume. All fields `None` means "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchVolume {
    pub total: Option<u64>,
    pub pc: Option<u64>,
    pub mobile: Option<u64>,
}

impl SearchVolume {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.total.is_none() && self.pc.is_none() && self.mobile.is_none()
    }
}

// --- Outcomes and audit ---

/// Result of processing one record. Serialized as the batch endpoint's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub id: String,
    pub keyword: String,
    pub rank: Option<u32>,
    pub search_volume: Option<u64>,
    pub nickname: Option<String>,
    pub link: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl UpdateOutcome {
    pub fn failed(record: &Record, error: impl Into<String>) -> Self {
        Self {
            id: record.id.clone(),
            keyword: record.keyword.clone(),
            rank: None,
            search_volume: None,
            nickname: None,
            link: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Who triggered an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: "system".to_string(),
        }
    }
}

/// Append-only audit row, one per persisted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub action: String,
    pub record_id: String,
    pub keyword: String,
    pub actor_id: String,
    pub actor_role: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Action recorded when a rank refresh is persisted.
pub const ACTION_RANK_UPDATED: &str = "rank_updated";
