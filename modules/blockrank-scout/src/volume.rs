use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use blockrank_common::{BlockRankError, Config, SearchVolume};
use searchad_client::SearchAdClient;

use crate::infra::Deadline;
use crate::traits::VolumeSource;

/// Keyword volume from the search-ads keyword tool. Without credentials
/// every lookup is unknown.
pub struct SearchAdVolume {
    client: Option<SearchAdClient>,
}

impl SearchAdVolume {
    pub fn new(client: Option<SearchAdClient>) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = config.searchad.as_ref().map(|creds| {
            SearchAdClient::new(
                creds.api_key.clone(),
                creds.secret_key.clone(),
                creds.customer_id.clone(),
            )
        });
        if client.is_none() {
            warn!("Search-ads credentials not set, search volume will be unknown");
        }
        Self::new(client)
    }

    async fn fetch(
        &self,
        client: &SearchAdClient,
        keyword: &str,
        timeout: Duration,
    ) -> Result<SearchVolume, BlockRankError> {
        let volume = Deadline::after(timeout)
            .run(client.keyword_volume(keyword))
            .await
            .map_err(|_| BlockRankError::VolumeFetch(format!("timed out after {timeout:?}")))?
            .map_err(|e| BlockRankError::VolumeFetch(e.to_string()))?;

        Ok(volume
            .map(|v| SearchVolume {
                total: v.total,
                pc: v.pc,
                mobile: v.mobile,
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl VolumeSource for SearchAdVolume {
    async fn volume(&self, keyword: &str, timeout: Duration) -> SearchVolume {
        let Some(client) = &self.client else {
            return SearchVolume::unknown();
        };

        match self.fetch(client, keyword, timeout).await {
            Ok(volume) => {
                debug!(keyword, total = volume.total, "Search volume fetched");
                volume
            }
            Err(e) => {
                warn!(keyword, error = %e, "Search volume unavailable");
                SearchVolume::unknown()
            }
        }
    }
}
